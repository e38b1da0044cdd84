use async_trait::async_trait;
use tracing::debug;

use muxforge_common::{AudioConfig, Track, TrackConfig, TrackId};
use muxforge_io::Reader;

use super::{id3v2_len, MpegAudioHeader};
use crate::demuxer::{FormatScanner, ScanResult};
use crate::frame_table::{FrameEntry, FrameTable};
use crate::framing::scan_frames;
use crate::Result;

/// Scanner for MPEG audio elementary streams, with or without ID3v2 tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Scanner;

/// Offset of the first byte after any leading ID3v2 tags.
async fn skip_id3v2(reader: &mut Reader) -> Result<u64> {
    let mut pos = 0u64;
    loop {
        reader.seek(pos);
        if !reader.has_bytes(10).await? {
            return Ok(pos);
        }
        let header = reader.read_bytes(10).await?;
        match id3v2_len(&header) {
            Some(len) => {
                debug!(offset = pos, len, "skipping ID3v2 tag");
                pos += len;
            }
            None => return Ok(pos),
        }
    }
}

#[async_trait]
impl FormatScanner for Mp3Scanner {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult> {
        let start = skip_id3v2(reader).await?;
        let frames = scan_frames::<MpegAudioHeader>(reader, start, "MPEG audio").await?;
        let Some(first) = frames.first().map(|f| f.header) else {
            debug!("no MPEG audio frames found");
            return Ok(ScanResult::default());
        };

        let track_id = TrackId::new(1);
        let sample_rate = first.sample_rate;
        let mut builder = FrameTable::builder();
        let mut samples: u64 = 0;

        for frame in &frames {
            let frame_samples = frame.header.samples() as u64;
            builder.push(FrameEntry {
                track_id,
                offset: frame.offset,
                size: frame.header.frame_len() as u32,
                header_len: 0,
                timestamp: samples as f64 / sample_rate as f64,
                duration: Some(frame_samples as f64 / sample_rate as f64),
                is_keyframe: true,
            });
            samples += frame_samples;
        }

        let config = AudioConfig::new(first.codec(), sample_rate, first.channels());
        Ok(ScanResult {
            tracks: vec![Track::new(track_id, TrackConfig::Audio(config))],
            table: builder.build(),
            duration: Some(samples as f64 / sample_rate as f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp3::tests::{frame, V1_L3_128K};
    use muxforge_common::Codec;
    use muxforge_io::BufferSource;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_id3_tag_is_skipped() {
        let mut data = vec![b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 20];
        data.extend(std::iter::repeat(0xFF).take(20));
        for _ in 0..3 {
            data.extend(frame(V1_L3_128K));
        }

        let mut reader = Reader::new(Arc::new(BufferSource::new(data)));
        let result = Mp3Scanner.scan(&mut reader).await.unwrap();

        assert_eq!(result.table.len(), 3);
        assert_eq!(result.table.entries()[0].offset, 30);
        let audio = result.tracks[0].audio().unwrap();
        assert_eq!(audio.codec, Codec::Mp3);
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(result.duration, Some(3.0 * 1152.0 / 44100.0));
    }
}
