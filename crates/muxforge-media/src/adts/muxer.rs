use async_trait::async_trait;

use muxforge_common::{Codec, EncodedPacket, Track, TrackConfig};
use muxforge_io::Writer;

use super::{
    sample_rate_index, AdtsHeader, AudioSpecificConfig, HEADER_LEN, MAX_FRAME_LEN,
    OBJECT_TYPE_AAC_LC,
};
use crate::muxer::FormatMuxer;
use crate::{Error, Result};

/// Writes one AAC track as ADTS, synthesizing a header per packet.
#[derive(Debug, Default)]
pub struct AdtsMuxer {
    template: Option<AdtsHeader>,
}

impl AdtsMuxer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn header_template(track: &Track) -> Result<AdtsHeader> {
    let audio = track
        .audio()
        .ok_or_else(|| Error::unsupported("ADTS carries audio only"))?;

    let (object_type, rate_index, channel_config) = match audio.codec_private.as_deref() {
        Some(asc) => {
            let asc = AudioSpecificConfig::parse(asc)?;
            (asc.object_type, asc.sample_rate_index, asc.channel_config)
        }
        None => {
            let rate_index = sample_rate_index(audio.sample_rate).ok_or_else(|| {
                Error::unsupported(format!("ADTS sample rate {}", audio.sample_rate))
            })?;
            let channel_config = match audio.channels {
                1..=6 => audio.channels as u8,
                8 => 7,
                n => return Err(Error::unsupported(format!("ADTS with {n} channels"))),
            };
            (OBJECT_TYPE_AAC_LC, rate_index, channel_config)
        }
    };

    if !(1..=4).contains(&object_type) {
        return Err(Error::unsupported(format!(
            "audio object type {object_type} in ADTS"
        )));
    }

    Ok(AdtsHeader {
        mpeg2: false,
        protection_absent: true,
        object_type,
        sample_rate_index: rate_index,
        channel_config,
        frame_len: 0,
        buffer_fullness: 0x7FF,
        raw_blocks: 1,
    })
}

#[async_trait]
impl FormatMuxer for AdtsMuxer {
    fn name(&self) -> &'static str {
        "ADTS"
    }

    fn check_track(&self, existing: &[Track], config: &TrackConfig) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::unsupported("ADTS carries a single track"));
        }
        match config {
            TrackConfig::Audio(audio) if audio.codec == Codec::Aac => Ok(()),
            other => Err(Error::unsupported(format!(
                "{} track in ADTS",
                other.codec()
            ))),
        }
    }

    async fn write_header(&mut self, _writer: &mut Writer, tracks: &[Track]) -> Result<()> {
        let track = tracks
            .first()
            .ok_or_else(|| Error::invalid_state("ADTS output has no track"))?;
        self.template = Some(header_template(track)?);
        Ok(())
    }

    async fn write_audio_packet(
        &mut self,
        writer: &mut Writer,
        _track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        let mut header = self
            .template
            .ok_or_else(|| Error::invalid_state("ADTS header not written"))?;

        let frame_len = HEADER_LEN + packet.data.len();
        if frame_len > MAX_FRAME_LEN {
            return Err(Error::unsupported(format!(
                "AAC frame of {} bytes exceeds the ADTS limit",
                packet.data.len()
            )));
        }
        header.frame_len = frame_len as u16;

        writer.write_bytes(&header.to_bytes()).await?;
        writer.write_owned(packet.data.clone()).await
    }

    async fn write_trailer(&mut self, _writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
        Ok(())
    }
}
