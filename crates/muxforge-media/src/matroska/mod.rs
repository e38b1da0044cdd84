//! Matroska and WebM demuxing.
//!
//! # Modules
//!
//! - [`codec`] maps `CodecID` strings to [`Codec`](muxforge_common::Codec)
//!   values and back.
//! - `scanner` walks the Segment and builds the frame table.
//!
//! # Block layout
//!
//! ```text
//! track number (vint) | i16 relative timestamp | flags | [lacing header] | frames
//! ```
//!
//! Flags bits 1-2 select the lacing mode. A laced block packs several frames
//! of one track; their sizes come from the lacing header.

pub mod codec;
mod scanner;

pub use codec::{codec_from_id, codec_id, is_webm_codec};
pub use scanner::MatroskaScanner;

use muxforge_io::vint;

use crate::{Error, Result};

/// Block lacing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    /// Lacing mode named by a block's flags octet.
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 1) & 0x03 {
            0 => Lacing::None,
            1 => Lacing::Xiph,
            2 => Lacing::Fixed,
            _ => Lacing::Ebml,
        }
    }
}

fn lacing_error(message: impl Into<String>) -> Error {
    Error::format("Matroska", message)
}

fn frame_size(size: u64) -> Result<u32> {
    u32::try_from(size).map_err(|_| lacing_error(format!("frame of {size} bytes is too large")))
}

fn lace_vint(data: &[u8], pos: usize) -> Result<vint::VInt> {
    data.get(pos..)
        .and_then(vint::decode)
        .ok_or_else(|| lacing_error("truncated EBML lacing"))
}

/// Decode the lacing header at the start of `data`, the block body after the
/// flags octet.
///
/// Returns the header length and the size of every frame that follows it.
/// Every size is checked against the bytes left in the block as it is read.
pub fn lace_sizes(lacing: Lacing, data: &[u8]) -> Result<(usize, Vec<u32>)> {
    if lacing == Lacing::None {
        return Ok((0, vec![frame_size(data.len() as u64)?]));
    }

    let count = *data
        .first()
        .ok_or_else(|| lacing_error("empty laced block"))? as usize
        + 1;

    if lacing == Lacing::Fixed {
        let total = data.len() - 1;
        if total % count != 0 {
            return Err(lacing_error(format!(
                "{total} bytes do not split into {count} fixed-size frames"
            )));
        }
        return Ok((1, vec![frame_size((total / count) as u64)?; count]));
    }

    let mut pos = 1;
    let mut sizes: Vec<u64> = Vec::with_capacity(count);
    if lacing == Lacing::Xiph {
        for _ in 1..count {
            let mut size = 0u64;
            loop {
                let b = *data
                    .get(pos)
                    .ok_or_else(|| lacing_error("truncated Xiph lacing"))?;
                pos += 1;
                size += b as u64;
                if b != 0xFF {
                    break;
                }
            }
            sizes.push(size);
        }
    } else if count > 1 {
        let first = lace_vint(data, pos)?;
        pos += first.length;
        if first.value > data.len() as u64 {
            return Err(lacing_error("EBML laced frame size out of range"));
        }
        sizes.push(first.value);

        // Later sizes are signed differences from the previous one.
        let limit = data.len() as i64;
        let mut previous = first.value as i64;
        for _ in 2..count {
            let raw = lace_vint(data, pos)?;
            pos += raw.length;
            let bias = (1i64 << (7 * raw.length - 1)) - 1;
            let size = (raw.value as i64)
                .checked_sub(bias)
                .and_then(|delta| previous.checked_add(delta))
                .filter(|size| (0..=limit).contains(size))
                .ok_or_else(|| lacing_error("EBML laced frame size out of range"))?;
            sizes.push(size as u64);
            previous = size;
        }
    }

    let remaining = data
        .len()
        .checked_sub(pos)
        .ok_or_else(|| lacing_error("lacing header overruns block"))? as u64;
    let mut used = 0u64;
    for size in &sizes {
        used = used
            .checked_add(*size)
            .filter(|used| *used <= remaining)
            .ok_or_else(|| {
                lacing_error(format!(
                    "laced frames need more than the {remaining} bytes in the block"
                ))
            })?;
    }
    sizes.push(remaining - used);

    let sizes = sizes
        .into_iter()
        .map(frame_size)
        .collect::<Result<Vec<_>>>()?;
    Ok((pos, sizes))
}
