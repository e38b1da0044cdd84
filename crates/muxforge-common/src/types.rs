//! Track and packet types shared by every demuxer and muxer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TrackId;

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

/// Sample layout of uncompressed PCM audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit little-endian.
    S16Le,
    /// Signed 24-bit little-endian.
    S24Le,
    /// Signed 32-bit little-endian.
    S32Le,
    /// IEEE float 32-bit little-endian.
    F32Le,
    /// IEEE float 64-bit little-endian.
    F64Le,
}

impl PcmFormat {
    /// Bits used by one sample.
    pub fn bits_per_sample(self) -> u16 {
        match self {
            PcmFormat::U8 => 8,
            PcmFormat::S16Le => 16,
            PcmFormat::S24Le => 24,
            PcmFormat::S32Le | PcmFormat::F32Le => 32,
            PcmFormat::F64Le => 64,
        }
    }

    /// Whether samples are IEEE floats.
    pub fn is_float(self) -> bool {
        matches!(self, PcmFormat::F32Le | PcmFormat::F64Le)
    }

    /// Short lowercase name (e.g. `s16le`).
    pub fn name(self) -> &'static str {
        match self {
            PcmFormat::U8 => "u8",
            PcmFormat::S16Le => "s16le",
            PcmFormat::S24Le => "s24le",
            PcmFormat::S32Le => "s32le",
            PcmFormat::F32Le => "f32le",
            PcmFormat::F64Le => "f64le",
        }
    }

    /// Resolve a layout from a WAV-style float flag and bit depth.
    pub fn from_bits(bits: u16, float: bool) -> Option<Self> {
        match (bits, float) {
            (8, false) => Some(PcmFormat::U8),
            (16, false) => Some(PcmFormat::S16Le),
            (24, false) => Some(PcmFormat::S24Le),
            (32, false) => Some(PcmFormat::S32Le),
            (32, true) => Some(PcmFormat::F32Le),
            (64, true) => Some(PcmFormat::F64Le),
            _ => None,
        }
    }
}

/// Codec carried by a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// H.264 / AVC video.
    Avc,
    /// H.265 / HEVC video.
    Hevc,
    /// VP8 video.
    Vp8,
    /// VP9 video.
    Vp9,
    /// AV1 video.
    Av1,
    /// AAC audio.
    Aac,
    /// MPEG-1/2 audio layer I.
    Mp1,
    /// MPEG-1/2 audio layer II.
    Mp2,
    /// MPEG-1/2 audio layer III.
    Mp3,
    /// Free Lossless Audio Codec.
    Flac,
    /// Opus audio.
    Opus,
    /// Vorbis audio.
    Vorbis,
    /// Uncompressed PCM audio.
    Pcm(PcmFormat),
    /// WebVTT subtitles.
    WebVtt,
    /// Plain UTF-8 text subtitles.
    Text,
    /// Any codec without first-class support, by container codec id.
    Other(String),
}

impl Codec {
    /// Whether the codec is a video codec.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            Codec::Avc | Codec::Hevc | Codec::Vp8 | Codec::Vp9 | Codec::Av1
        )
    }

    /// Whether the codec is an audio codec.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Codec::Aac
                | Codec::Mp1
                | Codec::Mp2
                | Codec::Mp3
                | Codec::Flac
                | Codec::Opus
                | Codec::Vorbis
                | Codec::Pcm(_)
        )
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Avc => write!(f, "avc"),
            Codec::Hevc => write!(f, "hevc"),
            Codec::Vp8 => write!(f, "vp8"),
            Codec::Vp9 => write!(f, "vp9"),
            Codec::Av1 => write!(f, "av1"),
            Codec::Aac => write!(f, "aac"),
            Codec::Mp1 => write!(f, "mp1"),
            Codec::Mp2 => write!(f, "mp2"),
            Codec::Mp3 => write!(f, "mp3"),
            Codec::Flac => write!(f, "flac"),
            Codec::Opus => write!(f, "opus"),
            Codec::Vorbis => write!(f, "vorbis"),
            Codec::Pcm(format) => write!(f, "pcm_{}", format.name()),
            Codec::WebVtt => write!(f, "webvtt"),
            Codec::Text => write!(f, "text"),
            Codec::Other(id) => write!(f, "{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Track configuration
// ---------------------------------------------------------------------------

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackType::Video => write!(f, "video"),
            TrackType::Audio => write!(f, "audio"),
            TrackType::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Parameters of a video track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Video codec.
    pub codec: Codec,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Nominal frame rate, if the container declares one.
    pub frame_rate: Option<f64>,
    /// Codec-specific configuration (avcC, hvcC, ...).
    pub codec_private: Option<Vec<u8>>,
}

impl VideoConfig {
    /// Create a video config without frame rate or codec private data.
    pub fn new(codec: Codec, width: u32, height: u32) -> Self {
        Self {
            codec,
            width,
            height,
            frame_rate: None,
            codec_private: None,
        }
    }
}

/// Parameters of an audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio codec.
    pub codec: Codec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample, for codecs where it is meaningful.
    pub bits_per_sample: Option<u16>,
    /// Codec-specific configuration (AudioSpecificConfig, STREAMINFO, ...).
    pub codec_private: Option<Vec<u8>>,
}

impl AudioConfig {
    /// Create an audio config without bit depth or codec private data.
    pub fn new(codec: Codec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bits_per_sample: None,
            codec_private: None,
        }
    }

    /// Builder-style bit depth.
    pub fn with_bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }

    /// Builder-style codec private data.
    pub fn with_codec_private(mut self, data: Vec<u8>) -> Self {
        self.codec_private = Some(data);
        self
    }
}

/// Parameters of a subtitle track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// Subtitle codec.
    pub codec: Codec,
    /// ISO 639 language code.
    pub language: Option<String>,
    /// Codec-specific configuration (e.g. a WebVTT header).
    pub codec_private: Option<Vec<u8>>,
}

impl SubtitleConfig {
    /// Create a subtitle config.
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            language: None,
            codec_private: None,
        }
    }
}

/// Format-specific configuration of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackConfig {
    Video(VideoConfig),
    Audio(AudioConfig),
    Subtitle(SubtitleConfig),
}

impl TrackConfig {
    /// Kind of media described by this config.
    pub fn track_type(&self) -> TrackType {
        match self {
            TrackConfig::Video(_) => TrackType::Video,
            TrackConfig::Audio(_) => TrackType::Audio,
            TrackConfig::Subtitle(_) => TrackType::Subtitle,
        }
    }

    /// Codec of the track.
    pub fn codec(&self) -> &Codec {
        match self {
            TrackConfig::Video(v) => &v.codec,
            TrackConfig::Audio(a) => &a.codec,
            TrackConfig::Subtitle(s) => &s.codec,
        }
    }

    /// Codec private data, if any.
    pub fn codec_private(&self) -> Option<&[u8]> {
        match self {
            TrackConfig::Video(v) => v.codec_private.as_deref(),
            TrackConfig::Audio(a) => a.codec_private.as_deref(),
            TrackConfig::Subtitle(s) => s.codec_private.as_deref(),
        }
    }
}

/// A track of a demuxed or muxed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// 1-based id, immutable once assigned.
    pub id: TrackId,
    /// Codec and format parameters.
    pub config: TrackConfig,
}

impl Track {
    /// Create a track.
    pub fn new(id: TrackId, config: TrackConfig) -> Self {
        Self { id, config }
    }

    /// Kind of media the track carries.
    pub fn track_type(&self) -> TrackType {
        self.config.track_type()
    }

    /// Codec of the track.
    pub fn codec(&self) -> &Codec {
        self.config.codec()
    }

    /// Audio parameters, when this is an audio track.
    pub fn audio(&self) -> Option<&AudioConfig> {
        match &self.config {
            TrackConfig::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// Video parameters, when this is a video track.
    pub fn video(&self) -> Option<&VideoConfig> {
        match &self.config {
            TrackConfig::Video(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// One compressed access unit exchanged across the demux/mux boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    /// Track the packet belongs to.
    pub track_id: TrackId,
    /// Opaque payload bytes, framing headers stripped.
    pub data: Bytes,
    /// Presentation timestamp in seconds.
    pub timestamp: f64,
    /// Duration in seconds, if known.
    pub duration: Option<f64>,
    /// Whether the packet is independently decodable.
    pub is_keyframe: bool,
}

impl EncodedPacket {
    /// Create a keyframe packet without duration.
    pub fn new(track_id: TrackId, data: impl Into<Bytes>, timestamp: f64) -> Self {
        Self {
            track_id,
            data: data.into(),
            timestamp,
            duration: None,
            is_keyframe: true,
        }
    }

    /// Builder-style duration.
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder-style keyframe flag.
    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// End time of the packet, when its duration is known.
    pub fn end_timestamp(&self) -> Option<f64> {
        self.duration.map(|d| self.timestamp + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_format_from_bits() {
        assert_eq!(PcmFormat::from_bits(16, false), Some(PcmFormat::S16Le));
        assert_eq!(PcmFormat::from_bits(32, true), Some(PcmFormat::F32Le));
        assert_eq!(PcmFormat::from_bits(12, false), None);
        assert_eq!(PcmFormat::S24Le.bits_per_sample(), 24);
        assert!(PcmFormat::F64Le.is_float());
    }

    #[test]
    fn test_codec_classification() {
        assert!(Codec::Vp9.is_video());
        assert!(Codec::Pcm(PcmFormat::U8).is_audio());
        assert!(!Codec::WebVtt.is_audio());
        assert!(!Codec::Other("X_CUSTOM".into()).is_video());
    }

    #[test]
    fn test_track_accessors() {
        let track = Track::new(
            TrackId::new(1),
            TrackConfig::Audio(AudioConfig::new(Codec::Flac, 44_100, 2).with_bits_per_sample(16)),
        );
        assert_eq!(track.track_type(), TrackType::Audio);
        assert_eq!(track.codec(), &Codec::Flac);
        assert_eq!(track.audio().map(|a| a.bits_per_sample), Some(Some(16)));
        assert!(track.video().is_none());
    }

    #[test]
    fn test_packet_builders() {
        let packet = EncodedPacket::new(TrackId::new(2), vec![1, 2, 3], 1.5)
            .with_duration(0.5)
            .with_keyframe(false);
        assert_eq!(packet.len(), 3);
        assert!(!packet.is_keyframe);
        assert_eq!(packet.end_timestamp(), Some(2.0));
    }

    #[test]
    fn test_subtitle_config_defaults() {
        let config = TrackConfig::Subtitle(SubtitleConfig::new(Codec::WebVtt));
        assert_eq!(config.track_type(), TrackType::Subtitle);
        assert!(config.codec_private().is_none());
    }

    #[test]
    fn test_codec_display() {
        assert_eq!(Codec::Pcm(PcmFormat::S16Le).to_string(), "pcm_s16le");
        assert_eq!(Codec::Aac.to_string(), "aac");
        assert_eq!(Codec::Other("V_THEORA".into()).to_string(), "V_THEORA");
    }
}
