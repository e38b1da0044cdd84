use async_trait::async_trait;
use tracing::debug;

use muxforge_common::{AudioConfig, Codec, Track, TrackConfig, TrackId};
use muxforge_io::Reader;

use super::AdtsHeader;
use crate::demuxer::{FormatScanner, ScanResult};
use crate::frame_table::{FrameEntry, FrameTable};
use crate::framing::scan_frames;
use crate::Result;

/// Scanner for raw ADTS streams; yields a single AAC track.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdtsScanner;

#[async_trait]
impl FormatScanner for AdtsScanner {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult> {
        let frames = scan_frames::<AdtsHeader>(reader, 0, "ADTS").await?;
        let Some(first) = frames.first().map(|f| f.header) else {
            debug!("no ADTS frames found");
            return Ok(ScanResult::default());
        };

        let track_id = TrackId::new(1);
        let sample_rate = first.sample_rate();
        let mut builder = FrameTable::builder();
        let mut samples: u64 = 0;

        for frame in &frames {
            let frame_samples = frame.header.samples() as u64;
            builder.push(FrameEntry {
                track_id,
                offset: frame.offset,
                size: frame.header.frame_len as u32,
                header_len: frame.header.header_len() as u32,
                timestamp: samples as f64 / sample_rate as f64,
                duration: Some(frame_samples as f64 / sample_rate as f64),
                is_keyframe: true,
            });
            samples += frame_samples;
        }

        let config = AudioConfig::new(Codec::Aac, sample_rate, first.channels())
            .with_codec_private(first.audio_specific_config().to_vec());

        Ok(ScanResult {
            tracks: vec![Track::new(track_id, TrackConfig::Audio(config))],
            table: builder.build(),
            duration: Some(samples as f64 / sample_rate as f64),
        })
    }
}
