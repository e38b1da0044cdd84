//! Format-independent demuxer.
//!
//! A [`Demuxer`] is bound to one [`Source`] for its lifetime. The first call
//! that needs stream information runs the format's scanner exactly once,
//! which produces the track list and an immutable [`FrameTable`]. Packets are
//! then served by table lookup: seek the reader to the frame, read its bytes,
//! strip any framing header.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use muxforge_common::{EncodedPacket, Track, TrackId};
use muxforge_io::{Reader, ReaderOptions, Source};

use crate::adts::{AdtsHeader, AdtsScanner};
use crate::flac::FlacScanner;
use crate::frame_table::FrameTable;
use crate::framing::find_sync;
use crate::matroska::MatroskaScanner;
use crate::mp3::{MpegAudioHeader, Mp3Scanner};
use crate::wav::{WavOptions, WavScanner};
use crate::{Error, Result};

/// Leading bytes searched for a frame sync when no magic number matches.
pub const SYNC_SEARCH_LEN: u64 = 64 * 1024;

/// Everything a scan pass learns about a stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub tracks: Vec<Track>,
    pub table: FrameTable,
    /// Declared or computed duration in seconds.
    pub duration: Option<f64>,
}

/// One offset-ordered pass over a container building its frame table.
#[async_trait]
pub trait FormatScanner: Send + Sync {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult>;
}

/// Container formats the demuxer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Adts,
    Mp3,
    Flac,
    Wav,
    Matroska,
}

impl InputFormat {
    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Adts => "ADTS",
            InputFormat::Mp3 => "MPEG audio",
            InputFormat::Flac => "FLAC",
            InputFormat::Wav => "WAV",
            InputFormat::Matroska => "Matroska",
        }
    }

    /// Sniff the container from its first bytes without consuming them.
    ///
    /// Without a recognized magic number, the first [`SYNC_SEARCH_LEN`]
    /// bytes are searched for a confirmed ADTS or MPEG audio frame.
    pub async fn detect(reader: &mut Reader) -> Result<Option<InputFormat>> {
        let head = reader
            .peek(|r| Box::pin(async move { r.read_up_to(12).await }))
            .await?;
        if let Some(format) = Self::from_magic(&head) {
            return Ok(Some(format));
        }

        let adts = reader
            .peek(|r| Box::pin(async move { find_sync::<AdtsHeader>(r, SYNC_SEARCH_LEN).await }))
            .await?;
        let mp3 = reader
            .peek(|r| {
                Box::pin(async move { find_sync::<MpegAudioHeader>(r, SYNC_SEARCH_LEN).await })
            })
            .await?;
        let format = match (adts, mp3) {
            (Some(a), Some(m)) if m < a => Some((InputFormat::Mp3, m)),
            (Some(a), _) => Some((InputFormat::Adts, a)),
            (None, Some(m)) => Some((InputFormat::Mp3, m)),
            (None, None) => None,
        };
        if let Some((format, offset)) = format {
            debug!(format = format.name(), offset, "format found by sync search");
        }
        Ok(format.map(|(format, _)| format))
    }

    fn from_magic(head: &[u8]) -> Option<InputFormat> {
        match head {
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(InputFormat::Matroska),
            [b'f', b'L', b'a', b'C', ..] => Some(InputFormat::Flac),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => {
                Some(InputFormat::Wav)
            }
            [b'I', b'D', b'3', ..] => Some(InputFormat::Mp3),
            // ADTS: 12-bit sync with layer bits zero.
            [0xFF, b1, ..] if b1 & 0xF6 == 0xF0 => Some(InputFormat::Adts),
            // MPEG audio: 11-bit sync, non-reserved version and layer.
            [0xFF, b1, ..] if b1 & 0xE0 == 0xE0 && b1 & 0x18 != 0x08 && b1 & 0x06 != 0 => {
                Some(InputFormat::Mp3)
            }
            _ => None,
        }
    }
}

/// Options for a [`Demuxer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxerOptions {
    pub reader: ReaderOptions,
    pub wav: WavOptions,
}

/// Lifecycle of a [`Demuxer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxerState {
    Uninitialized,
    Scanning,
    Ready,
    Closed,
}

/// Demuxer over a single source.
pub struct Demuxer {
    reader: Reader,
    format: Option<InputFormat>,
    options: DemuxerOptions,
    state: DemuxerState,
    scan: ScanResult,
    /// Next unread position within each track's frames.
    cursors: HashMap<TrackId, usize>,
}

impl std::fmt::Debug for Demuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demuxer")
            .field("format", &self.format)
            .field("state", &self.state)
            .field("tracks", &self.scan.tracks.len())
            .field("frames", &self.scan.table.len())
            .finish()
    }
}

impl Demuxer {
    /// Demuxer that sniffs the format on [`init`](Self::init).
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self::with_options(source, None, DemuxerOptions::default())
    }

    /// Demuxer for a known format.
    pub fn with_format(source: Arc<dyn Source>, format: InputFormat) -> Self {
        Self::with_options(source, Some(format), DemuxerOptions::default())
    }

    pub fn with_options(
        source: Arc<dyn Source>,
        format: Option<InputFormat>,
        options: DemuxerOptions,
    ) -> Self {
        let reader = Reader::with_options(source, options.reader.clone());
        Self {
            reader,
            format,
            options,
            state: DemuxerState::Uninitialized,
            scan: ScanResult::default(),
            cursors: HashMap::new(),
        }
    }

    pub fn state(&self) -> DemuxerState {
        self.state
    }

    /// The detected or configured format, once known.
    pub fn format(&self) -> Option<InputFormat> {
        self.format
    }

    /// Scan the source. Later calls return immediately.
    pub async fn init(&mut self) -> Result<()> {
        match self.state {
            DemuxerState::Ready => return Ok(()),
            DemuxerState::Closed => return Err(Error::invalid_state("demuxer is closed")),
            DemuxerState::Uninitialized | DemuxerState::Scanning => {}
        }

        let format = match self.format {
            Some(format) => format,
            None => InputFormat::detect(&mut self.reader)
                .await?
                .ok_or_else(|| Error::unsupported("unrecognized container format"))?,
        };
        self.format = Some(format);

        self.state = DemuxerState::Scanning;
        let result = self.run_scanner(format).await;
        let scan = match result {
            Ok(scan) => scan,
            Err(e) => {
                self.state = DemuxerState::Uninitialized;
                return Err(e);
            }
        };

        info!(
            format = format.name(),
            tracks = scan.tracks.len(),
            frames = scan.table.len(),
            duration = ?scan.duration,
            "demuxer ready"
        );
        self.cursors = scan.tracks.iter().map(|t| (t.id, 0)).collect();
        self.scan = scan;
        self.state = DemuxerState::Ready;
        Ok(())
    }

    async fn run_scanner(&mut self, format: InputFormat) -> Result<ScanResult> {
        let reader = &mut self.reader;
        reader.seek(0);
        match format {
            InputFormat::Adts => AdtsScanner.scan(reader).await,
            InputFormat::Mp3 => Mp3Scanner.scan(reader).await,
            InputFormat::Flac => FlacScanner.scan(reader).await,
            InputFormat::Wav => WavScanner::new(self.options.wav.clone()).scan(reader).await,
            InputFormat::Matroska => MatroskaScanner.scan(reader).await,
        }
    }

    /// Tracks found in the stream.
    pub async fn tracks(&mut self) -> Result<&[Track]> {
        self.init().await?;
        Ok(&self.scan.tracks)
    }

    /// Stream duration in seconds, if it could be determined.
    pub async fn duration(&mut self) -> Result<Option<f64>> {
        self.init().await?;
        Ok(self.scan.duration)
    }

    /// The frame table built by the scan.
    pub async fn frame_table(&mut self) -> Result<&FrameTable> {
        self.init().await?;
        Ok(&self.scan.table)
    }

    /// Read the next packet of `track`, or `None` past its last frame.
    ///
    /// An id that names no track also yields `None`.
    pub async fn read_packet(&mut self, track: TrackId) -> Result<Option<EncodedPacket>> {
        self.init().await?;

        let Some(cursor) = self.cursors.get(&track).copied() else {
            return Ok(None);
        };
        let Some(entry) = self.scan.table.track_entry(track, cursor).copied() else {
            return Ok(None);
        };

        self.reader.seek(entry.payload_offset());
        let data = self.reader.read_bytes(entry.payload_len()).await?;
        self.cursors.insert(track, cursor + 1);

        let mut packet = EncodedPacket::new(track, data, entry.timestamp)
            .with_keyframe(entry.is_keyframe);
        packet.duration = entry.duration;
        Ok(Some(packet))
    }

    /// Reposition every track at the access point preceding `time` seconds.
    ///
    /// Returns the earliest timestamp any track will resume from.
    pub async fn seek(&mut self, time: f64) -> Result<f64> {
        self.init().await?;

        let mut resumed: Option<f64> = None;
        for track in &self.scan.tracks {
            let table = &self.scan.table;
            let Some(position) = table.seek_position(track.id, time) else {
                continue;
            };
            self.cursors.insert(track.id, position);
            if let Some(entry) = table.track_entry(track.id, position) {
                resumed = Some(resumed.map_or(entry.timestamp, |t: f64| t.min(entry.timestamp)));
            }
        }

        let resumed = resumed.unwrap_or(0.0);
        debug!(target_time = time, resumed, "demuxer seek");
        Ok(resumed)
    }

    /// Release the source. The demuxer cannot be used afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == DemuxerState::Closed {
            return Ok(());
        }
        self.state = DemuxerState::Closed;
        self.reader.source().close().await
    }
}
