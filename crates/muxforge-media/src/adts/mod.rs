//! ADTS (Audio Data Transport Stream) framed AAC.
//!
//! Every frame starts with a 7-byte header, or 9 bytes when a CRC follows:
//!
//! ```text
//! Bits | Field
//! ---- | -----
//! 12   | sync word 0xFFF
//! 1    | MPEG version (0 = MPEG-4, 1 = MPEG-2)
//! 2    | layer, always 0
//! 1    | protection absent (1 = no CRC)
//! 2    | profile (audio object type - 1)
//! 4    | sampling frequency index
//! 1    | private
//! 3    | channel configuration
//! 4    | originality / home / copyright bits
//! 13   | frame length including header
//! 11   | buffer fullness
//! 2    | raw data blocks in frame - 1
//! 16   | CRC, only when protection absent is 0
//! ```

mod muxer;
mod scanner;

pub use muxer::AdtsMuxer;
pub use scanner::AdtsScanner;

use crate::framing::FrameHeader;
use crate::{Error, Result};

/// Sampling frequencies addressed by the 4-bit index.
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Samples carried by one raw data block.
pub const SAMPLES_PER_BLOCK: u32 = 1024;

/// Header length without CRC.
pub const HEADER_LEN: usize = 7;

/// Largest frame length the 13-bit field can express.
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// AAC Low Complexity.
pub const OBJECT_TYPE_AAC_LC: u8 = 2;

/// Index of `rate` in [`SAMPLE_RATES`].
pub fn sample_rate_index(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|&r| r == rate).map(|i| i as u8)
}

/// A decoded ADTS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub mpeg2: bool,
    pub protection_absent: bool,
    /// Audio object type (profile field + 1).
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub channel_config: u8,
    pub frame_len: u16,
    pub buffer_fullness: u16,
    pub raw_blocks: u8,
}

impl AdtsHeader {
    /// Decode a header from at least 7 bytes.
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < HEADER_LEN || b[0] != 0xFF || b[1] & 0xF6 != 0xF0 {
            return None;
        }
        let sample_rate_index = (b[2] >> 2) & 0x0F;
        if sample_rate_index as usize >= SAMPLE_RATES.len() {
            return None;
        }
        let header = AdtsHeader {
            mpeg2: b[1] & 0x08 != 0,
            protection_absent: b[1] & 0x01 != 0,
            object_type: ((b[2] >> 6) & 0x03) + 1,
            sample_rate_index,
            channel_config: ((b[2] & 0x01) << 2) | (b[3] >> 6),
            frame_len: (((b[3] & 0x03) as u16) << 11) | ((b[4] as u16) << 3) | ((b[5] >> 5) as u16),
            buffer_fullness: (((b[5] & 0x1F) as u16) << 6) | ((b[6] >> 2) as u16),
            raw_blocks: (b[6] & 0x03) + 1,
        };
        if (header.frame_len as usize) <= header.header_len() {
            return None;
        }
        Some(header)
    }

    /// Header length, including the CRC when present.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            HEADER_LEN
        } else {
            HEADER_LEN + 2
        }
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[self.sample_rate_index as usize]
    }

    /// Channel count; configuration 0 (defined in-band) is taken as stereo.
    pub fn channels(&self) -> u16 {
        match self.channel_config {
            0 => 2,
            7 => 8,
            n => n as u16,
        }
    }

    /// PCM samples per channel decoded from this frame.
    pub fn samples(&self) -> u32 {
        SAMPLES_PER_BLOCK * self.raw_blocks as u32
    }

    /// The 2-byte AudioSpecificConfig describing this stream.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        audio_specific_config(self.object_type, self.sample_rate_index, self.channel_config)
    }

    /// Serialize a CRC-less header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let len = self.frame_len;
        let fullness = self.buffer_fullness;
        [
            0xFF,
            0xF1 | ((self.mpeg2 as u8) << 3),
            ((self.object_type - 1) & 0x03) << 6
                | (self.sample_rate_index << 2)
                | ((self.channel_config >> 2) & 0x01),
            ((self.channel_config & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
            (len >> 3) as u8,
            (((len & 0x07) as u8) << 5) | ((fullness >> 6) & 0x1F) as u8,
            (((fullness & 0x3F) as u8) << 2) | ((self.raw_blocks - 1) & 0x03),
        ]
    }
}

impl FrameHeader for AdtsHeader {
    const PROBE_LEN: usize = HEADER_LEN;

    fn parse(bytes: &[u8]) -> Option<Self> {
        AdtsHeader::parse(bytes)
    }

    fn frame_len(&self) -> usize {
        self.frame_len as usize
    }

    fn is_consistent_with(&self, other: &Self) -> bool {
        self.object_type == other.object_type
            && self.sample_rate_index == other.sample_rate_index
            && self.channel_config == other.channel_config
            && self.mpeg2 == other.mpeg2
    }
}

/// Pack an AudioSpecificConfig: 5-bit object type, 4-bit rate index,
/// 4-bit channel configuration, 3 zero bits.
pub fn audio_specific_config(object_type: u8, sample_rate_index: u8, channel_config: u8) -> [u8; 2] {
    let packed = ((object_type as u16 & 0x1F) << 11)
        | ((sample_rate_index as u16 & 0x0F) << 7)
        | ((channel_config as u16 & 0x0F) << 3);
    packed.to_be_bytes()
}

/// Fields recovered from an AudioSpecificConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub channel_config: u8,
}

impl AudioSpecificConfig {
    /// Parse the leading fields. Escaped object types and explicit
    /// frequencies are rejected.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [a, b, ..] = data else {
            return Err(Error::format("AAC", "AudioSpecificConfig shorter than 2 bytes"));
        };
        let object_type = a >> 3;
        let sample_rate_index = ((a & 0x07) << 1) | (b >> 7);
        let channel_config = (b >> 3) & 0x0F;
        if object_type == 31 || sample_rate_index as usize >= SAMPLE_RATES.len() {
            return Err(Error::unsupported(format!(
                "AudioSpecificConfig with object type {object_type}, rate index {sample_rate_index}"
            )));
        }
        Ok(Self {
            object_type,
            sample_rate_index,
            channel_config,
        })
    }
}
