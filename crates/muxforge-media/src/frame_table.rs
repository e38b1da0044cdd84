//! Frame tables built by demuxer scans.
//!
//! A scan produces one [`FrameEntry`] per container frame, in stream order.
//! Once built the table is immutable; the demuxer reads packets and seeks by
//! walking per-track index lists into it.

use std::collections::HashMap;

use muxforge_common::TrackId;
use tracing::warn;

/// One frame located by a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEntry {
    /// Track the frame belongs to.
    pub track_id: TrackId,
    /// Absolute offset of the frame, including any framing header.
    pub offset: u64,
    /// Total bytes to read at `offset`.
    pub size: u32,
    /// Leading framing bytes stripped from the packet payload.
    pub header_len: u32,
    /// Presentation time in seconds.
    pub timestamp: f64,
    /// Duration in seconds, when the container states it.
    pub duration: Option<f64>,
    /// Whether the frame is independently decodable.
    pub is_keyframe: bool,
}

impl FrameEntry {
    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_len as u64
    }

    /// Payload length with the framing header removed.
    pub fn payload_len(&self) -> usize {
        self.size.saturating_sub(self.header_len) as usize
    }

    /// Offset one past the frame.
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Immutable, offset-ordered index of frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTable {
    entries: Vec<FrameEntry>,
    by_track: HashMap<TrackId, Vec<usize>>,
}

impl FrameTable {
    /// Create a builder.
    pub fn builder() -> FrameTableBuilder {
        FrameTableBuilder::default()
    }

    /// All entries in stream order.
    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of frames belonging to `track`.
    pub fn track_len(&self, track: TrackId) -> usize {
        self.by_track.get(&track).map_or(0, Vec::len)
    }

    /// The `n`th frame of `track`.
    pub fn track_entry(&self, track: TrackId, n: usize) -> Option<&FrameEntry> {
        let index = *self.by_track.get(&track)?.get(n)?;
        self.entries.get(index)
    }

    /// Iterate over the frames of one track.
    pub fn track_entries(&self, track: TrackId) -> impl Iterator<Item = &FrameEntry> {
        self.by_track
            .get(&track)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.entries.get(i))
    }

    /// Position within `track` to resume from for a seek to `time`.
    ///
    /// Finds the first frame whose timestamp is at or after `time` and returns
    /// the one before it, clamped to the first frame. Past the last frame the
    /// last frame is returned. `None` when the track has no frames.
    pub fn seek_position(&self, track: TrackId, time: f64) -> Option<usize> {
        let indices = self.by_track.get(&track)?;
        if indices.is_empty() {
            return None;
        }
        let first_at_or_after = indices
            .iter()
            .position(|&i| self.entries[i].timestamp >= time)
            .unwrap_or(indices.len());
        Some(first_at_or_after.saturating_sub(1))
    }

    /// End time of the last frame across all tracks.
    pub fn end_time(&self) -> Option<f64> {
        self.entries
            .iter()
            .map(|e| e.timestamp + e.duration.unwrap_or(0.0))
            .reduce(f64::max)
    }
}

/// Accumulates frames during a scan.
#[derive(Debug, Default)]
pub struct FrameTableBuilder {
    entries: Vec<FrameEntry>,
    last_timestamp: HashMap<TrackId, f64>,
}

impl FrameTableBuilder {
    /// Append a frame.
    ///
    /// Frames must arrive in offset order. A timestamp earlier than the
    /// previous frame of the same track is raised to it.
    pub fn push(&mut self, mut entry: FrameEntry) {
        if let Some(&last) = self.last_timestamp.get(&entry.track_id) {
            if entry.timestamp < last {
                warn!(
                    track = %entry.track_id,
                    timestamp = entry.timestamp,
                    previous = last,
                    "non-monotonic frame timestamp"
                );
                entry.timestamp = last;
            }
        }
        self.last_timestamp.insert(entry.track_id, entry.timestamp);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the table.
    pub fn build(mut self) -> FrameTable {
        self.entries.sort_by_key(|e| e.offset);
        let mut by_track: HashMap<TrackId, Vec<usize>> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            by_track.entry(entry.track_id).or_default().push(i);
        }
        FrameTable {
            entries: self.entries,
            by_track,
        }
    }
}
