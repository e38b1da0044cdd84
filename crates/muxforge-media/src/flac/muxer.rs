use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use muxforge_common::{AudioConfig, Codec, EncodedPacket, Track, TrackConfig};
use muxforge_io::Writer;

use super::{FlacFrameHeader, StreamInfo, BLOCK_STREAMINFO, MAGIC, STREAMINFO_LEN};
use crate::muxer::FormatMuxer;
use crate::{Error, Result};

/// Writes a native FLAC stream.
///
/// STREAMINFO needs block and frame size bounds and the total sample count,
/// so frames are buffered and the whole stream is written at the trailer.
#[derive(Debug, Default)]
pub struct FlacMuxer {
    frames: Vec<Bytes>,
    min_block: u32,
    max_block: u32,
    min_frame: u32,
    max_frame: u32,
    total_samples: u64,
}

impl FlacMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_size(packet: &EncodedPacket, audio: &AudioConfig) -> u32 {
        match FlacFrameHeader::parse(&packet.data) {
            Some(header) => header.block_size,
            None => packet
                .duration
                .map_or(0, |d| (d * audio.sample_rate as f64).round() as u32),
        }
    }

    fn stream_info(&self, audio: &AudioConfig) -> Result<StreamInfo> {
        let mut info = match audio.codec_private.as_deref() {
            Some(raw) if raw.len() >= STREAMINFO_LEN => StreamInfo::parse(raw)?,
            _ => StreamInfo {
                min_block_size: 0,
                max_block_size: 0,
                min_frame_size: 0,
                max_frame_size: 0,
                sample_rate: audio.sample_rate,
                channels: 0,
                bits_per_sample: 0,
                total_samples: 0,
                md5: [0; 16],
            },
        };

        if !(1..=8).contains(&audio.channels) {
            return Err(Error::unsupported(format!("FLAC with {} channels", audio.channels)));
        }
        info.sample_rate = audio.sample_rate;
        info.channels = audio.channels as u8;
        info.bits_per_sample = audio.bits_per_sample.unwrap_or(16) as u8;

        if self.frames.is_empty() {
            info.min_block_size = 4096;
            info.max_block_size = 4096;
            info.min_frame_size = 0;
            info.max_frame_size = 0;
        } else {
            info.min_block_size = self.min_block as u16;
            info.max_block_size = self.max_block as u16;
            info.min_frame_size = self.min_frame;
            info.max_frame_size = self.max_frame;
        }
        info.total_samples = self.total_samples;
        Ok(info)
    }
}

#[async_trait]
impl FormatMuxer for FlacMuxer {
    fn name(&self) -> &'static str {
        "FLAC"
    }

    fn check_track(&self, existing: &[Track], config: &TrackConfig) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::unsupported("FLAC carries a single track"));
        }
        match config {
            TrackConfig::Audio(audio) if audio.codec == Codec::Flac => Ok(()),
            other => Err(Error::unsupported(format!("{} track in FLAC", other.codec()))),
        }
    }

    async fn write_header(&mut self, _writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
        Ok(())
    }

    async fn write_audio_packet(
        &mut self,
        _writer: &mut Writer,
        track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        let audio = track
            .audio()
            .ok_or_else(|| Error::invalid_state("FLAC track without audio config"))?;
        let block = Self::block_size(packet, audio);
        let size = packet.data.len() as u32;

        if self.frames.is_empty() {
            self.min_block = block;
            self.min_frame = size;
        }
        self.min_block = self.min_block.min(block);
        self.max_block = self.max_block.max(block);
        self.min_frame = self.min_frame.min(size);
        self.max_frame = self.max_frame.max(size);
        self.total_samples += block as u64;
        self.frames.push(packet.data.clone());
        Ok(())
    }

    async fn write_trailer(&mut self, writer: &mut Writer, tracks: &[Track]) -> Result<()> {
        let audio = tracks
            .first()
            .and_then(Track::audio)
            .ok_or_else(|| Error::invalid_state("FLAC output has no audio track"))?;
        let info = self.stream_info(audio)?;

        writer.write_bytes(MAGIC).await?;
        writer.write_u8(0x80 | BLOCK_STREAMINFO).await?;
        writer.write_u24_be(STREAMINFO_LEN as u32).await?;
        writer.write_bytes(&info.to_bytes()).await?;
        for frame in self.frames.drain(..) {
            writer.write_owned(frame).await?;
        }

        debug!(
            total_samples = info.total_samples,
            max_frame = info.max_frame_size,
            "FLAC stream written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flac::tests::frame;
    use crate::muxer::{Muxer, OutputFormat};
    use muxforge_common::TrackId;

    #[tokio::test]
    async fn test_streaminfo_reflects_written_frames() {
        let muxer = Muxer::new(OutputFormat::Flac, None);
        let id = muxer
            .add_audio_track(AudioConfig::new(Codec::Flac, 44100, 2).with_bits_per_sample(16))
            .await
            .unwrap();
        let frames = [frame(0, 100), frame(1, 300)];
        for (n, f) in frames.iter().enumerate() {
            let packet = EncodedPacket::new(id, f.clone(), n as f64 * 4096.0 / 44100.0);
            muxer.write_packet(packet).await.unwrap();
        }
        let out = muxer.finalize().await.unwrap();

        assert_eq!(&out[..4], MAGIC);
        assert_eq!(&out[4..8], &[0x80, 0, 0, 34]);
        let info = StreamInfo::parse(&out[8..42]).unwrap();
        assert_eq!(info.total_samples, 8192);
        assert_eq!(info.min_block_size, 4096);
        assert_eq!(info.min_frame_size as usize, frames[0].len());
        assert_eq!(info.max_frame_size as usize, frames[1].len());
        assert_eq!(info.channels, 2);
        assert_eq!(out.len(), 42 + frames[0].len() + frames[1].len());
    }

    #[tokio::test]
    async fn test_only_flac_accepted() {
        let muxer = FlacMuxer::new();
        let opus = TrackConfig::Audio(AudioConfig::new(Codec::Opus, 48000, 2));
        assert!(muxer.check_track(&[], &opus).is_err());

        let flac = AudioConfig::new(Codec::Flac, 48000, 2);
        let existing = [Track::new(TrackId::new(1), TrackConfig::Audio(flac.clone()))];
        assert!(muxer.check_track(&existing, &TrackConfig::Audio(flac)).is_err());
    }
}
