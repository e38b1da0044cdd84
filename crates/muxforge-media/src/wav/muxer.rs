use async_trait::async_trait;
use tracing::debug;

use muxforge_common::{Codec, EncodedPacket, Track, TrackConfig};
use muxforge_io::Writer;

use super::{FmtChunk, UNKNOWN_SIZE};
use crate::muxer::FormatMuxer;
use crate::{Error, Result};

/// Writes a RIFF/WAVE file from a single PCM track.
///
/// Sizes are written as `0xFFFFFFFF` and patched at the trailer when the
/// writer can seek; a sequential target keeps the placeholders.
#[derive(Debug, Default)]
pub struct WavMuxer {
    data_start: u64,
}

impl WavMuxer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormatMuxer for WavMuxer {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn check_track(&self, existing: &[Track], config: &TrackConfig) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::unsupported("WAV carries a single track"));
        }
        match config {
            TrackConfig::Audio(audio) if matches!(audio.codec, Codec::Pcm(_)) => Ok(()),
            other => Err(Error::unsupported(format!("{} track in WAV", other.codec()))),
        }
    }

    async fn write_header(&mut self, writer: &mut Writer, tracks: &[Track]) -> Result<()> {
        let audio = tracks
            .first()
            .and_then(Track::audio)
            .ok_or_else(|| Error::invalid_state("WAV output has no audio track"))?;
        let Codec::Pcm(format) = audio.codec else {
            return Err(Error::unsupported(format!("{} in WAV", audio.codec)));
        };
        let fmt = FmtChunk::for_pcm(format, audio.sample_rate, audio.channels);

        writer.write_fourcc(b"RIFF").await?;
        writer.write_u32_le(UNKNOWN_SIZE).await?;
        writer.write_fourcc(b"WAVE").await?;
        writer.write_fourcc(b"fmt ").await?;
        writer.write_u32_le(16).await?;
        writer.write_bytes(&fmt.to_bytes()).await?;
        writer.write_fourcc(b"data").await?;
        writer.write_u32_le(UNKNOWN_SIZE).await?;
        self.data_start = writer.position();
        Ok(())
    }

    async fn write_audio_packet(
        &mut self,
        writer: &mut Writer,
        _track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        writer.write_owned(packet.data.clone()).await
    }

    async fn write_trailer(&mut self, writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
        let data_len = writer.position() - self.data_start;
        if data_len % 2 == 1 {
            writer.write_u8(0).await?;
        }
        let end = writer.position();

        if !writer.is_seekable() {
            debug!(data_len, "sequential target, leaving WAV sizes unset");
            return Ok(());
        }
        if end - 8 > u32::MAX as u64 {
            return Err(Error::unsupported("WAV output larger than 4 GiB"));
        }

        writer.seek(4).await?;
        writer.write_u32_le((end - 8) as u32).await?;
        writer.seek(self.data_start - 4).await?;
        writer.write_u32_le(data_len as u32).await?;
        writer.seek(end).await?;
        debug!(data_len, "WAV sizes patched");
        Ok(())
    }
}
