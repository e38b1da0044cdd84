//! MPEG-1/2/2.5 audio (layers I, II and III) frame parsing.
//!
//! The 32-bit frame header:
//!
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A sync (11 bits)      B version        C layer       D no CRC
//! E bitrate index       F rate index     G padding     H private
//! I channel mode        J mode ext.      K copyright   L original   M emphasis
//! ```

mod muxer;
mod scanner;

pub use muxer::Mp3Muxer;
pub use scanner::Mp3Scanner;

use muxforge_common::Codec;

use crate::framing::FrameHeader;

/// MPEG audio version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V2_5,
}

/// MPEG audio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegLayer {
    L1,
    L2,
    L3,
}

// Bitrates in kbit/s, indexed by the 4-bit field; index 0 is free format.
const BITRATES_V1_L1: [u16; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const BITRATES_V1_L2: [u16; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATES_V1_L3: [u16; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L1: [u16; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u16; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];

/// A decoded MPEG audio frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegAudioHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    pub has_crc: bool,
    /// Bitrate in bit/s.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: u8,
}

impl MpegAudioHeader {
    /// Decode a header from at least 4 bytes. Free-format and reserved
    /// values are rejected.
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < 4 || b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (b[1] >> 3) & 0x03 {
            0 => MpegVersion::V2_5,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match (b[1] >> 1) & 0x03 {
            1 => MpegLayer::L3,
            2 => MpegLayer::L2,
            3 => MpegLayer::L1,
            _ => return None,
        };

        let bitrate_index = (b[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let table = match (version, layer) {
            (MpegVersion::V1, MpegLayer::L1) => &BITRATES_V1_L1,
            (MpegVersion::V1, MpegLayer::L2) => &BITRATES_V1_L2,
            (MpegVersion::V1, MpegLayer::L3) => &BITRATES_V1_L3,
            (_, MpegLayer::L1) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };

        let rate_index = ((b[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }
        let base_rate = SAMPLE_RATES_V1[rate_index];
        let sample_rate = match version {
            MpegVersion::V1 => base_rate,
            MpegVersion::V2 => base_rate / 2,
            MpegVersion::V2_5 => base_rate / 4,
        };

        Some(Self {
            version,
            layer,
            has_crc: b[1] & 0x01 == 0,
            bitrate: table[bitrate_index] as u32 * 1000,
            sample_rate,
            padding: b[2] & 0x02 != 0,
            channel_mode: b[3] >> 6,
        })
    }

    /// Samples per channel in one frame.
    pub fn samples(&self) -> u32 {
        match (self.layer, self.version) {
            (MpegLayer::L1, _) => 384,
            (MpegLayer::L2, _) => 1152,
            (MpegLayer::L3, MpegVersion::V1) => 1152,
            (MpegLayer::L3, _) => 576,
        }
    }

    /// Frame length in bytes including the header.
    ///
    /// Layer I counts in 4-byte slots, layers II and III in single bytes.
    pub fn frame_len(&self) -> usize {
        let padding = self.padding as u32;
        let len = match (self.layer, self.version) {
            (MpegLayer::L1, _) => (12 * self.bitrate / self.sample_rate + padding) * 4,
            (MpegLayer::L3, MpegVersion::V2 | MpegVersion::V2_5) => {
                72 * self.bitrate / self.sample_rate + padding
            }
            _ => 144 * self.bitrate / self.sample_rate + padding,
        };
        len as usize
    }

    pub fn channels(&self) -> u16 {
        if self.channel_mode == 3 {
            1
        } else {
            2
        }
    }

    pub fn codec(&self) -> Codec {
        match self.layer {
            MpegLayer::L1 => Codec::Mp1,
            MpegLayer::L2 => Codec::Mp2,
            MpegLayer::L3 => Codec::Mp3,
        }
    }
}

impl FrameHeader for MpegAudioHeader {
    const PROBE_LEN: usize = 4;

    fn parse(bytes: &[u8]) -> Option<Self> {
        MpegAudioHeader::parse(bytes)
    }

    fn frame_len(&self) -> usize {
        MpegAudioHeader::frame_len(self)
    }

    fn is_consistent_with(&self, other: &Self) -> bool {
        self.version == other.version
            && self.layer == other.layer
            && self.sample_rate == other.sample_rate
    }
}

/// Size of an ID3v2 tag starting with `header`, including its 10-byte
/// header and optional footer.
pub fn id3v2_len(header: &[u8]) -> Option<u64> {
    if header.len() < 10 || &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
        return None;
    }
    if header[6..10].iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let size = header[6..10]
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | b as u64);
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}
