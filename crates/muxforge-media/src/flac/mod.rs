//! FLAC native stream parsing.
//!
//! A stream is the `fLaC` marker, a chain of metadata blocks (STREAMINFO
//! first and mandatory), then audio frames. Frames carry no length field, so
//! a frame ends where the next valid frame header begins.

mod muxer;
mod scanner;

pub use muxer::FlacMuxer;
pub use scanner::FlacScanner;

use crate::{Error, Result};

/// Stream marker.
pub const MAGIC: &[u8; 4] = b"fLaC";

/// Length of the STREAMINFO block body.
pub const STREAMINFO_LEN: usize = 34;

/// Metadata block type of STREAMINFO.
pub const BLOCK_STREAMINFO: u8 = 0;

/// Longest possible frame header (sync through CRC-8).
pub const MAX_FRAME_HEADER_LEN: usize = 16;

/// The STREAMINFO metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    /// Smallest frame in bytes; 0 when unknown.
    pub min_frame_size: u32,
    /// Largest frame in bytes; 0 when unknown.
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Samples per channel; 0 when unknown.
    pub total_samples: u64,
    pub md5: [u8; 16],
}

impl StreamInfo {
    /// Decode the 34-byte block body.
    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < STREAMINFO_LEN {
            return Err(Error::format(
                "FLAC",
                format!("STREAMINFO of {} bytes", b.len()),
            ));
        }
        let u24 = |i: usize| u32::from_be_bytes([0, b[i], b[i + 1], b[i + 2]]);
        let mut packed_bytes = [0u8; 8];
        packed_bytes.copy_from_slice(&b[10..18]);
        let packed = u64::from_be_bytes(packed_bytes);
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&b[18..34]);

        let info = Self {
            min_block_size: u16::from_be_bytes([b[0], b[1]]),
            max_block_size: u16::from_be_bytes([b[2], b[3]]),
            min_frame_size: u24(4),
            max_frame_size: u24(7),
            sample_rate: (packed >> 44) as u32,
            channels: ((packed >> 41) & 0x07) as u8 + 1,
            bits_per_sample: ((packed >> 36) & 0x1F) as u8 + 1,
            total_samples: packed & 0xF_FFFF_FFFF,
            md5,
        };
        if info.sample_rate == 0 {
            return Err(Error::format("FLAC", "STREAMINFO sample rate is 0"));
        }
        Ok(info)
    }

    /// Encode the 34-byte block body.
    pub fn to_bytes(&self) -> [u8; STREAMINFO_LEN] {
        let mut out = [0u8; STREAMINFO_LEN];
        out[0..2].copy_from_slice(&self.min_block_size.to_be_bytes());
        out[2..4].copy_from_slice(&self.max_block_size.to_be_bytes());
        out[4..7].copy_from_slice(&self.min_frame_size.to_be_bytes()[1..]);
        out[7..10].copy_from_slice(&self.max_frame_size.to_be_bytes()[1..]);
        let packed = ((self.sample_rate as u64 & 0xF_FFFF) << 44)
            | (((self.channels.saturating_sub(1)) as u64 & 0x07) << 41)
            | (((self.bits_per_sample.saturating_sub(1)) as u64 & 0x1F) << 36)
            | (self.total_samples & 0xF_FFFF_FFFF);
        out[10..18].copy_from_slice(&packed.to_be_bytes());
        out[18..34].copy_from_slice(&self.md5);
        out
    }

    /// Stream duration in seconds, when the sample count is known.
    pub fn duration(&self) -> Option<f64> {
        (self.total_samples > 0).then(|| self.total_samples as f64 / self.sample_rate as f64)
    }
}

/// A decoded audio frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlacFrameHeader {
    /// Variable block size strategy: `number` counts samples, not frames.
    pub variable_block_size: bool,
    pub block_size: u32,
    /// Sample rate coded in the header; `None` means "see STREAMINFO".
    pub sample_rate: Option<u32>,
    pub channel_assignment: u8,
    /// Frame number or first sample number.
    pub number: u64,
    /// Bytes from the sync code through the CRC-8.
    pub header_len: usize,
}

impl FlacFrameHeader {
    /// Decode and CRC-check a frame header at the start of `b`.
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < 6 || b[0] != 0xFF || b[1] & 0xFE != 0xF8 {
            return None;
        }
        let variable_block_size = b[1] & 0x01 != 0;
        let block_code = b[2] >> 4;
        let rate_code = b[2] & 0x0F;
        let channel_assignment = b[3] >> 4;
        let size_code = (b[3] >> 1) & 0x07;
        if block_code == 0
            || rate_code == 0x0F
            || channel_assignment > 10
            || size_code == 3
            || b[3] & 0x01 != 0
        {
            return None;
        }

        let (number, mut idx) = read_utf8_number(b, 4)?;

        let block_size = match block_code {
            1 => 192,
            2..=5 => 576 << (block_code - 2),
            6 => {
                let v = *b.get(idx)? as u32 + 1;
                idx += 1;
                v
            }
            7 => {
                let v = u16::from_be_bytes([*b.get(idx)?, *b.get(idx + 1)?]) as u32 + 1;
                idx += 2;
                v
            }
            _ => 256 << (block_code - 8),
        };

        let sample_rate = match rate_code {
            0 => None,
            1 => Some(88200),
            2 => Some(176400),
            3 => Some(192000),
            4 => Some(8000),
            5 => Some(16000),
            6 => Some(22050),
            7 => Some(24000),
            8 => Some(32000),
            9 => Some(44100),
            10 => Some(48000),
            11 => Some(96000),
            12 => {
                let v = *b.get(idx)? as u32 * 1000;
                idx += 1;
                Some(v)
            }
            13 | 14 => {
                let v = u16::from_be_bytes([*b.get(idx)?, *b.get(idx + 1)?]) as u32;
                idx += 2;
                Some(if rate_code == 14 { v * 10 } else { v })
            }
            _ => return None,
        };

        let crc = *b.get(idx)?;
        if crc8(&b[..idx]) != crc {
            return None;
        }

        Some(Self {
            variable_block_size,
            block_size,
            sample_rate,
            channel_assignment,
            number,
            header_len: idx + 1,
        })
    }

    /// Whether `next` can directly follow this frame.
    pub fn is_followed_by(&self, next: &FlacFrameHeader) -> bool {
        if self.variable_block_size != next.variable_block_size {
            return false;
        }
        if self.variable_block_size {
            next.number == self.number + self.block_size as u64
        } else {
            next.number == self.number + 1
        }
    }
}

/// Decode the UTF-8-style coded number at `b[at..]`; returns the value and
/// the index after it.
fn read_utf8_number(b: &[u8], at: usize) -> Option<(u64, usize)> {
    let first = *b.get(at)?;
    let (len, mut value) = match first {
        0x00..=0x7F => (1, first as u64),
        0xC0..=0xDF => (2, (first & 0x1F) as u64),
        0xE0..=0xEF => (3, (first & 0x0F) as u64),
        0xF0..=0xF7 => (4, (first & 0x07) as u64),
        0xF8..=0xFB => (5, (first & 0x03) as u64),
        0xFC..=0xFD => (6, (first & 0x01) as u64),
        0xFE => (7, 0),
        _ => return None,
    };
    for i in 1..len {
        let byte = *b.get(at + i)?;
        if byte & 0xC0 != 0x80 {
            return None;
        }
        value = (value << 6) | (byte & 0x3F) as u64;
    }
    Some((value, at + len))
}

/// Encode `value` as a UTF-8-style coded number.
pub fn write_utf8_number(value: u64, out: &mut Vec<u8>) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }
    let len = match value {
        0..=0x7FF => 2,
        0x800..=0xFFFF => 3,
        0x1_0000..=0x1F_FFFF => 4,
        0x20_0000..=0x3FF_FFFF => 5,
        0x400_0000..=0x7FFF_FFFF => 6,
        _ => 7,
    };
    let lead_mask: u8 = !(0xFFu8 >> len);
    let shift = 6 * (len - 1);
    out.push(lead_mask | (value >> shift) as u8 & (0x7F >> len));
    for i in (0..len - 1).rev() {
        out.push(0x80 | ((value >> (6 * i)) & 0x3F) as u8);
    }
}

/// CRC-8, polynomial x^8 + x^2 + x + 1, initial value 0.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

/// Continue a CRC-16 (polynomial x^16 + x^15 + x^2 + 1) over `data`.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
    }
    crc
}
