//! WAV/RIFF parsing and writing.
//!
//! ```text
//! "RIFF" u32le(size) "WAVE"
//!   "fmt " u32le(len) format_tag channels rate byte_rate block_align bits [ext]
//!   ...other chunks...
//!   "data" u32le(len) samples
//! ```
//!
//! Chunk bodies of odd length are followed by one pad byte. A size of
//! `0xFFFFFFFF` (or 0 for `data`) marks a stream written without seeking back.

mod muxer;
mod scanner;

pub use muxer::WavMuxer;
pub use scanner::WavScanner;

use serde::{Deserialize, Serialize};

use muxforge_common::PcmFormat;

use crate::{Error, Result};

pub const FORMAT_PCM: u16 = 0x0001;
pub const FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size field value for a chunk whose length was not known when written.
pub const UNKNOWN_SIZE: u32 = 0xFFFF_FFFF;

/// Tail shared by every WAVE_FORMAT_EXTENSIBLE sub-format GUID; the first two
/// bytes carry the plain format tag.
const GUID_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Options for WAV demuxing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WavOptions {
    /// Sample frames per emitted packet.
    pub frames_per_packet: u32,
}

impl Default for WavOptions {
    fn default() -> Self {
        Self {
            frames_per_packet: 1024,
        }
    }
}

/// Decoded `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmtChunk {
    /// Effective format tag; for WAVE_FORMAT_EXTENSIBLE the sub-format's.
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FmtChunk {
    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < 16 {
            return Err(Error::format("WAV", format!("fmt chunk of {} bytes", b.len())));
        }
        let u16le = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let u32le = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);

        let mut format_tag = u16le(0);
        if format_tag == FORMAT_EXTENSIBLE {
            // cbSize(2) validBits(2) channelMask(4) then the 16-byte GUID.
            if b.len() < 40 {
                return Err(Error::format("WAV", "truncated WAVE_FORMAT_EXTENSIBLE"));
            }
            let guid = &b[24..40];
            if guid[2..] != GUID_TAIL {
                return Err(Error::unsupported("WAV sub-format with a foreign GUID"));
            }
            format_tag = u16::from_le_bytes([guid[0], guid[1]]);
        }

        let fmt = Self {
            format_tag,
            channels: u16le(2),
            sample_rate: u32le(4),
            byte_rate: u32le(8),
            block_align: u16le(12),
            bits_per_sample: u16le(14),
        };
        if fmt.channels == 0 || fmt.sample_rate == 0 || fmt.block_align == 0 {
            return Err(Error::format(
                "WAV",
                "fmt chunk with zero channels, rate or block alignment",
            ));
        }
        Ok(fmt)
    }

    /// The 16-byte body of a plain `fmt ` chunk.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.format_tag.to_le_bytes());
        out[2..4].copy_from_slice(&self.channels.to_le_bytes());
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..12].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[12..14].copy_from_slice(&self.block_align.to_le_bytes());
        out[14..16].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out
    }

    pub fn pcm_format(&self) -> Result<PcmFormat> {
        let float = match self.format_tag {
            FORMAT_PCM => false,
            FORMAT_IEEE_FLOAT => true,
            tag => return Err(Error::unsupported(format!("WAV format tag {tag:#06x}"))),
        };
        PcmFormat::from_bits(self.bits_per_sample, float).ok_or_else(|| {
            Error::unsupported(format!(
                "{}-bit {} WAV samples",
                self.bits_per_sample,
                if float { "float" } else { "integer" }
            ))
        })
    }

    /// Describe `format` at the given rate and channel count.
    pub fn for_pcm(format: PcmFormat, sample_rate: u32, channels: u16) -> Self {
        let bits = format.bits_per_sample();
        let block_align = channels * bits / 8;
        Self {
            format_tag: if format.is_float() {
                FORMAT_IEEE_FLOAT
            } else {
                FORMAT_PCM
            },
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: bits,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// RIFF/WAVE header with a plain fmt chunk, followed by a data chunk of
    /// `data_len` declared bytes. The caller appends the samples.
    pub(crate) fn wav_header(fmt: &FmtChunk, data_len: u32) -> Vec<u8> {
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&data_len.wrapping_add(36).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&fmt.to_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out
    }

    #[test]
    fn test_fmt_round_trip() {
        let fmt = FmtChunk::for_pcm(PcmFormat::S16Le, 44100, 2);
        assert_eq!(fmt.block_align, 4);
        assert_eq!(fmt.byte_rate, 176_400);
        assert_eq!(FmtChunk::parse(&fmt.to_bytes()).unwrap(), fmt);
        assert_eq!(fmt.pcm_format().unwrap(), PcmFormat::S16Le);
    }

    #[test]
    fn test_extensible_uses_guid_format() {
        let base = FmtChunk::for_pcm(PcmFormat::F32Le, 48000, 2);
        let mut b = base.to_bytes().to_vec();
        b[0..2].copy_from_slice(&FORMAT_EXTENSIBLE.to_le_bytes());
        b.extend_from_slice(&22u16.to_le_bytes());
        b.extend_from_slice(&32u16.to_le_bytes());
        b.extend_from_slice(&3u32.to_le_bytes());
        b.extend_from_slice(&FORMAT_IEEE_FLOAT.to_le_bytes());
        b.extend_from_slice(&GUID_TAIL);

        let parsed = FmtChunk::parse(&b).unwrap();
        assert_eq!(parsed.format_tag, FORMAT_IEEE_FLOAT);
        assert_eq!(parsed.pcm_format().unwrap(), PcmFormat::F32Le);
    }

    #[test]
    fn test_unknown_format_tag_unsupported() {
        let mut fmt = FmtChunk::for_pcm(PcmFormat::S16Le, 8000, 1);
        fmt.format_tag = 0x0055;
        assert!(matches!(fmt.pcm_format(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_short_fmt_rejected() {
        assert!(matches!(
            FmtChunk::parse(&[1, 0, 2, 0]),
            Err(Error::Format { format: "WAV", .. })
        ));
    }
}
