use async_trait::async_trait;

use muxforge_common::{Codec, EncodedPacket, Track, TrackConfig};
use muxforge_io::Writer;

use crate::muxer::FormatMuxer;
use crate::{Error, Result};

/// Writes MPEG audio frames back to back. Packets must be complete frames.
#[derive(Debug, Default)]
pub struct Mp3Muxer;

impl Mp3Muxer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FormatMuxer for Mp3Muxer {
    fn name(&self) -> &'static str {
        "MPEG audio"
    }

    fn check_track(&self, existing: &[Track], config: &TrackConfig) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::unsupported("MPEG audio carries a single track"));
        }
        match config {
            TrackConfig::Audio(audio)
                if matches!(audio.codec, Codec::Mp1 | Codec::Mp2 | Codec::Mp3) =>
            {
                Ok(())
            }
            other => Err(Error::unsupported(format!(
                "{} track in MPEG audio",
                other.codec()
            ))),
        }
    }

    async fn write_header(&mut self, _writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
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

    async fn write_trailer(&mut self, _writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
        Ok(())
    }
}
