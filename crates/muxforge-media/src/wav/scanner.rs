use async_trait::async_trait;
use tracing::{debug, warn};

use muxforge_common::{AudioConfig, Codec, Track, TrackConfig, TrackId};
use muxforge_io::Reader;

use super::{FmtChunk, WavOptions, UNKNOWN_SIZE};
use crate::demuxer::{FormatScanner, ScanResult};
use crate::frame_table::{FrameEntry, FrameTable};
use crate::{Error, Result};

/// Frames per packet, at least one and capped so a packet's byte size fits
/// a frame entry.
fn packet_frames(frames_per_packet: u32, block_align: u64) -> u64 {
    (frames_per_packet as u64).clamp(1, (u32::MAX as u64 / block_align).max(1))
}

/// Scanner for RIFF/WAVE files holding PCM or IEEE float samples.
#[derive(Debug, Clone, Default)]
pub struct WavScanner {
    options: WavOptions,
}

impl WavScanner {
    pub fn new(options: WavOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl FormatScanner for WavScanner {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult> {
        reader.seek(0);
        let riff = reader.read_fourcc().await?;
        let _riff_size = reader.read_u32_le().await?;
        let wave = reader.read_fourcc().await?;
        if &riff != b"RIFF" || &wave != b"WAVE" {
            return Err(Error::format("WAV", "missing RIFF/WAVE header"));
        }

        let mut fmt: Option<FmtChunk> = None;
        let data = loop {
            if !reader.has_bytes(8).await? {
                break None;
            }
            let id = reader.read_fourcc().await?;
            let size = reader.read_u32_le().await?;
            let body = reader.position();

            match &id {
                b"fmt " => {
                    let raw = reader.read_bytes(size as usize).await?;
                    fmt = Some(FmtChunk::parse(&raw)?);
                }
                b"data" => break Some((body, size)),
                _ => debug!(
                    chunk = %String::from_utf8_lossy(&id),
                    size,
                    "skipping WAV chunk"
                ),
            }
            reader.seek(body + size as u64 + (size & 1) as u64);
        };

        let fmt = fmt.ok_or_else(|| Error::format("WAV", "missing fmt chunk"))?;
        let format = fmt.pcm_format()?;

        let track_id = TrackId::new(1);
        let config = AudioConfig::new(Codec::Pcm(format), fmt.sample_rate, fmt.channels)
            .with_bits_per_sample(fmt.bits_per_sample);
        let tracks = vec![Track::new(track_id, TrackConfig::Audio(config))];

        let Some((data_start, declared)) = data else {
            warn!("WAV file without a data chunk");
            return Ok(ScanResult {
                tracks,
                table: FrameTable::default(),
                duration: Some(0.0),
            });
        };

        let stream_end = reader.resolve_size().await?;
        let available = stream_end.saturating_sub(data_start);
        let data_len = match declared {
            0 | UNKNOWN_SIZE => {
                debug!(available, "WAV data size not recorded, using stream length");
                available
            }
            n if n as u64 > available => {
                warn!(declared = n, available, "WAV data chunk truncated");
                available
            }
            n => n as u64,
        };

        let block_align = fmt.block_align as u64;
        let total_frames = data_len / block_align;
        let packet_frames = packet_frames(self.options.frames_per_packet, block_align);
        let rate = fmt.sample_rate as f64;

        let mut builder = FrameTable::builder();
        let mut frame = 0u64;
        while frame < total_frames {
            let count = packet_frames.min(total_frames - frame);
            builder.push(FrameEntry {
                track_id,
                offset: data_start + frame * block_align,
                size: u32::try_from(count * block_align)
                    .map_err(|_| Error::format("WAV", "packet larger than 4 GiB"))?,
                header_len: 0,
                timestamp: frame as f64 / rate,
                duration: Some(count as f64 / rate),
                is_keyframe: true,
            });
            frame += count;
        }

        debug!(
            frames = total_frames,
            packets = builder.len(),
            format = format.name(),
            "WAV scan complete"
        );
        Ok(ScanResult {
            tracks,
            table: builder.build(),
            duration: Some(total_frames as f64 / rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::tests::wav_header;
    use muxforge_common::PcmFormat;
    use muxforge_io::BufferSource;
    use std::sync::Arc;

    async fn scan(data: Vec<u8>, frames_per_packet: u32) -> Result<ScanResult> {
        let mut reader = Reader::new(Arc::new(BufferSource::new(data)));
        WavScanner::new(WavOptions { frames_per_packet })
            .scan(&mut reader)
            .await
    }

    fn s16_stereo() -> FmtChunk {
        FmtChunk::for_pcm(PcmFormat::S16Le, 8000, 2)
    }

    #[tokio::test]
    async fn test_packets_split_by_frame_count() {
        let mut data = wav_header(&s16_stereo(), 2500 * 4);
        data.extend(std::iter::repeat(0x22).take(2500 * 4));

        let result = scan(data, 1000).await.unwrap();
        let entries = result.table.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].offset, 44);
        assert_eq!(entries[2].size, 500 * 4);
        assert_eq!(entries[1].timestamp, 0.125);
        assert_eq!(result.duration, Some(2500.0 / 8000.0));
        assert_eq!(
            result.tracks[0].codec(),
            &Codec::Pcm(PcmFormat::S16Le)
        );
    }

    #[tokio::test]
    async fn test_unknown_data_size_extends_to_eof() {
        let mut data = wav_header(&s16_stereo(), UNKNOWN_SIZE);
        data.extend(std::iter::repeat(0x22).take(401));

        let result = scan(data, 1024).await.unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.entries()[0].size, 400);
    }

    #[tokio::test]
    async fn test_missing_fmt_is_fatal() {
        let mut data = b"RIFF\x10\0\0\0WAVE".to_vec();
        data.extend_from_slice(b"data\x04\0\0\0\x01\x02\x03\x04");
        let err = scan(data, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Format { format: "WAV", .. }));
    }

    #[tokio::test]
    async fn test_odd_chunk_is_padded() {
        let fmt = s16_stereo();
        let mut data = b"RIFF\0\0\0\0WAVE".to_vec();
        data.extend_from_slice(b"fmt \x10\0\0\0");
        data.extend_from_slice(&fmt.to_bytes());
        data.extend_from_slice(b"LIST\x03\0\0\0abc\0");
        data.extend_from_slice(b"data\x08\0\0\0");
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let result = scan(data, 1024).await.unwrap();
        assert_eq!(result.table.entries()[0].offset, 12 + 24 + 12 + 8);
        assert_eq!(result.table.entries()[0].size, 8);
    }

    #[test]
    fn test_packet_frames_fit_entry_size() {
        assert_eq!(packet_frames(0, 4), 1);
        assert_eq!(packet_frames(1024, 4), 1024);

        let align = 6 * 4;
        let frames = packet_frames(u32::MAX, align);
        assert!(frames * align <= u32::MAX as u64);
        assert_eq!(frames, u32::MAX as u64 / align);
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let data = b"RIFX\0\0\0\0WAVEfmt ".to_vec();
        assert!(scan(data, 1024).await.is_err());
    }
}
