//! Sync-word scanning shared by the header-framed formats (ADTS, MPEG audio).
//!
//! The scanner walks forward one frame at a time. When the bytes at the
//! cursor do not form a valid header it advances one byte and retries. After
//! such a resync, a candidate is only accepted once the header that should
//! follow it is valid and consistent, or the candidate ends exactly at the
//! end of the stream.

use muxforge_io::Reader;
use tracing::{debug, trace, warn};

use crate::Result;

/// A fixed-position frame header.
pub(crate) trait FrameHeader: Sized + Copy {
    /// Bytes needed to decode a header.
    const PROBE_LEN: usize;

    /// Decode a header from the start of `bytes`.
    fn parse(bytes: &[u8]) -> Option<Self>;

    /// Total frame length including the header.
    fn frame_len(&self) -> usize;

    /// Whether `other` can belong to the same stream.
    fn is_consistent_with(&self, other: &Self) -> bool;
}

/// A frame located by [`scan_frames`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocatedFrame<H> {
    pub offset: u64,
    pub header: H,
}

async fn header_at<H: FrameHeader>(reader: &mut Reader, pos: u64) -> Result<Option<H>> {
    reader.seek(pos);
    if !reader.has_bytes(H::PROBE_LEN).await? {
        return Ok(None);
    }
    let bytes = reader.read_bytes(H::PROBE_LEN).await?;
    Ok(H::parse(&bytes))
}

/// Offset of the first confirmed frame within the first `limit` bytes.
///
/// A candidate counts when the header after it is valid and consistent, or
/// when the frame ends exactly at the end of the input.
pub(crate) async fn find_sync<H: FrameHeader>(
    reader: &mut Reader,
    limit: u64,
) -> Result<Option<u64>> {
    for pos in 0..limit {
        reader.seek(pos);
        if !reader.has_bytes(H::PROBE_LEN).await? {
            return Ok(None);
        }
        let Some(header) = header_at::<H>(reader, pos).await? else {
            continue;
        };

        let next = pos + header.frame_len() as u64;
        reader.seek(next);
        let confirmed = if reader.has_bytes(1).await? {
            matches!(
                header_at::<H>(reader, next).await?,
                Some(following) if header.is_consistent_with(&following)
            )
        } else {
            reader.seek(pos);
            reader.has_bytes(header.frame_len()).await?
        };
        if confirmed {
            return Ok(Some(pos));
        }
    }
    Ok(None)
}

/// Locate every frame from `start` to the end of the input.
pub(crate) async fn scan_frames<H: FrameHeader>(
    reader: &mut Reader,
    start: u64,
    format: &'static str,
) -> Result<Vec<LocatedFrame<H>>> {
    let mut frames: Vec<LocatedFrame<H>> = Vec::new();
    let mut pos = start;
    // Offset where the previous accepted frame ended.
    let mut expected: Option<u64> = None;
    let mut skipped = 0u64;

    loop {
        reader.seek(pos);
        if !reader.has_bytes(H::PROBE_LEN).await? {
            break;
        }

        let Some(header) = header_at::<H>(reader, pos).await? else {
            trace!(format, offset = pos, "no sync, advancing");
            pos += 1;
            skipped += 1;
            continue;
        };

        if let Some(last) = frames.last() {
            if !last.header.is_consistent_with(&header) {
                trace!(format, offset = pos, "inconsistent header, advancing");
                pos += 1;
                skipped += 1;
                continue;
            }
        }

        let len = header.frame_len() as u64;
        let in_lock = expected == Some(pos);

        reader.seek(pos);
        if !reader.has_bytes(len as usize).await? {
            if in_lock {
                warn!(format, offset = pos, len, "dropping truncated trailing frame");
                break;
            }
            pos += 1;
            skipped += 1;
            continue;
        }

        let next = pos + len;
        let confirmed = in_lock || {
            reader.seek(next);
            if !reader.has_bytes(1).await? {
                true
            } else {
                match header_at::<H>(reader, next).await? {
                    Some(following) => header.is_consistent_with(&following),
                    None => false,
                }
            }
        };

        if !confirmed {
            trace!(format, offset = pos, "unconfirmed sync, advancing");
            pos += 1;
            skipped += 1;
            continue;
        }

        frames.push(LocatedFrame {
            offset: pos,
            header,
        });
        expected = Some(next);
        pos = next;
    }

    debug!(format, frames = frames.len(), skipped, "frame scan complete");
    Ok(frames)
}
