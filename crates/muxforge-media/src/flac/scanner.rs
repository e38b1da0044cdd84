use async_trait::async_trait;
use tracing::{debug, warn};

use muxforge_common::{AudioConfig, Codec, Track, TrackConfig, TrackId};
use muxforge_io::Reader;

use super::{
    crc16_update, FlacFrameHeader, StreamInfo, BLOCK_STREAMINFO, MAGIC, MAX_FRAME_HEADER_LEN,
    STREAMINFO_LEN,
};
use crate::demuxer::{FormatScanner, ScanResult};
use crate::frame_table::{FrameEntry, FrameTable};
use crate::{Error, Result};

/// Lookahead used when STREAMINFO does not state a maximum frame size.
const DEFAULT_WINDOW: usize = 64 * 1024;

/// Give up on a frame boundary beyond this many bytes.
const MAX_WINDOW: usize = 16 * 1024 * 1024;

/// Scanner for native FLAC streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlacScanner;

struct Metadata {
    info: StreamInfo,
    raw_info: Vec<u8>,
    audio_start: u64,
}

async fn read_metadata(reader: &mut Reader) -> Result<Metadata> {
    reader.seek(0);
    if &reader.read_fourcc().await? != MAGIC {
        return Err(Error::format("FLAC", "missing fLaC marker"));
    }

    let mut info = None;
    loop {
        let block_header = reader.read_u8().await?;
        let is_last = block_header & 0x80 != 0;
        let block_type = block_header & 0x7F;
        let len = reader.read_u24_be().await? as u64;
        let body = reader.position();

        if block_type == BLOCK_STREAMINFO {
            if (len as usize) < STREAMINFO_LEN {
                return Err(Error::format("FLAC", format!("STREAMINFO block of {len} bytes")));
            }
            let raw = reader.read_bytes(STREAMINFO_LEN).await?;
            info = Some((StreamInfo::parse(&raw)?, raw.to_vec()));
        } else {
            debug!(block_type, len, "skipping metadata block");
        }

        reader.seek(body + len);
        if is_last {
            break;
        }
    }

    let (info, raw_info) =
        info.ok_or_else(|| Error::format("FLAC", "missing STREAMINFO block"))?;
    Ok(Metadata {
        info,
        raw_info,
        audio_start: reader.position(),
    })
}

/// Find where the frame starting at `pos` ends.
///
/// Candidates must be a valid header that numerically follows `header`, and
/// the bytes before them must end in a matching CRC-16. Returns `None` when
/// no boundary is found and the frame does not end cleanly at EOF.
async fn frame_end(
    reader: &mut Reader,
    pos: u64,
    header: &FlacFrameHeader,
    initial_window: usize,
) -> Result<Option<u64>> {
    let min_len = header.header_len + 2;
    let mut window = initial_window.max(min_len + MAX_FRAME_HEADER_LEN);

    loop {
        reader.seek(pos);
        let buf = reader.read_up_to(window).await?;
        let at_eof = buf.len() < window;
        if buf.len() < min_len {
            return Ok(None);
        }

        // Without EOF, leave room for a full candidate header.
        let limit = if at_eof {
            buf.len()
        } else {
            buf.len() - MAX_FRAME_HEADER_LEN
        };

        let mut crc = crc16_update(0, &buf[..min_len - 2]);
        for i in min_len..limit {
            let stored = u16::from_be_bytes([buf[i - 2], buf[i - 1]]);
            let sync = buf[i] == 0xFF && buf.get(i + 1).is_some_and(|b| b & 0xFE == 0xF8);
            if sync && crc == stored {
                if let Some(next) = FlacFrameHeader::parse(&buf[i..]) {
                    if header.is_followed_by(&next) {
                        return Ok(Some(pos + i as u64));
                    }
                }
            }
            crc = crc16_update(crc, &buf[i - 2..i - 1]);
        }

        if at_eof {
            let tail_crc = crc16_update(0, &buf[..buf.len() - 2]);
            let stored = u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]);
            return Ok((tail_crc == stored).then_some(pos + buf.len() as u64));
        }

        if window >= MAX_WINDOW {
            warn!(offset = pos, window, "no FLAC frame boundary within lookahead");
            return Ok(None);
        }
        window = (window * 2).min(MAX_WINDOW);
    }
}

#[async_trait]
impl FormatScanner for FlacScanner {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult> {
        let meta = read_metadata(reader).await?;
        let info = meta.info;
        let window = match info.max_frame_size {
            0 => DEFAULT_WINDOW,
            n => n as usize + MAX_FRAME_HEADER_LEN,
        };

        let track_id = TrackId::new(1);
        let mut builder = FrameTable::builder();
        let mut pos = meta.audio_start;
        let mut samples: u64 = 0;

        loop {
            reader.seek(pos);
            let probe = reader.read_up_to(MAX_FRAME_HEADER_LEN).await?;
            if probe.is_empty() {
                break;
            }
            let Some(header) = FlacFrameHeader::parse(&probe) else {
                warn!(offset = pos, "invalid FLAC frame header, stopping scan");
                break;
            };
            let Some(end) = frame_end(reader, pos, &header, window).await? else {
                warn!(offset = pos, "dropping truncated trailing frame");
                break;
            };

            let rate = info.sample_rate as f64;
            builder.push(FrameEntry {
                track_id,
                offset: pos,
                size: (end - pos) as u32,
                header_len: 0,
                timestamp: samples as f64 / rate,
                duration: Some(header.block_size as f64 / rate),
                is_keyframe: true,
            });
            samples += header.block_size as u64;
            pos = end;
        }

        debug!(frames = builder.len(), samples, "FLAC scan complete");

        let config = AudioConfig::new(Codec::Flac, info.sample_rate, info.channels as u16)
            .with_bits_per_sample(info.bits_per_sample as u16)
            .with_codec_private(meta.raw_info);
        let duration = info
            .duration()
            .or_else(|| (samples > 0).then(|| samples as f64 / info.sample_rate as f64));

        Ok(ScanResult {
            tracks: vec![Track::new(track_id, TrackConfig::Audio(config))],
            table: builder.build(),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flac::tests::{frame, stream_header, stream_info};
    use muxforge_io::BufferSource;
    use std::sync::Arc;

    async fn scan(data: Vec<u8>) -> Result<ScanResult> {
        let mut reader = Reader::new(Arc::new(BufferSource::new(data)));
        FlacScanner.scan(&mut reader).await
    }

    #[tokio::test]
    async fn test_streaminfo_duration() {
        let result = scan(stream_header(&stream_info(441_000))).await.unwrap();
        assert_eq!(result.duration, Some(10.0));
        let audio = result.tracks[0].audio().unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.bits_per_sample, Some(16));
        assert_eq!(audio.codec_private.as_ref().map(Vec::len), Some(STREAMINFO_LEN));
    }

    #[tokio::test]
    async fn test_frames_are_bounded_by_next_header() {
        let mut data = stream_header(&stream_info(3 * 4096));
        let frames: Vec<Vec<u8>> = (0..3).map(|n| frame(n, 300 + n as usize * 50)).collect();
        for f in &frames {
            data.extend_from_slice(f);
        }

        let result = scan(data).await.unwrap();
        let entries = result.table.entries();
        assert_eq!(entries.len(), 3);
        for (entry, f) in entries.iter().zip(&frames) {
            assert_eq!(entry.size as usize, f.len());
        }
        assert_eq!(entries[1].timestamp, 4096.0 / 44100.0);
        assert_eq!(entries[2].offset, entries[1].end());
    }

    #[tokio::test]
    async fn test_small_window_grows() {
        let mut info = stream_info(2 * 4096);
        info.max_frame_size = 8;
        let mut data = stream_header(&info);
        data.extend(frame(0, 500));
        data.extend(frame(1, 20));

        let result = scan(data).await.unwrap();
        assert_eq!(result.table.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_streaminfo_is_fatal() {
        let mut data = MAGIC.to_vec();
        // Last block, type 4 (VORBIS_COMMENT), empty.
        data.extend_from_slice(&[0x84, 0, 0, 0]);
        let err = scan(data).await.unwrap_err();
        assert!(matches!(err, Error::Format { format: "FLAC", .. }));
    }

    #[tokio::test]
    async fn test_other_blocks_skipped() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&[0x00, 0, 0, STREAMINFO_LEN as u8]);
        data.extend_from_slice(&stream_info(4096).to_bytes());
        data.extend_from_slice(&[0x81, 0, 0, 5, 1, 2, 3, 4, 5]);
        data.extend(frame(0, 64));

        let result = scan(data).await.unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.entries()[0].offset, 4 + 4 + 34 + 4 + 5);
    }

    #[tokio::test]
    async fn test_truncated_last_frame_dropped() {
        let mut data = stream_header(&stream_info(0));
        data.extend(frame(0, 100));
        let partial = frame(1, 100);
        data.extend_from_slice(&partial[..60]);

        let result = scan(data).await.unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.duration, Some(4096.0 / 44100.0));
    }
}
