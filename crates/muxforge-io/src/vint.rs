//! EBML-style variable-length integers.
//!
//! The number of leading zero bits in the first octet, plus one, gives the
//! total length (1 to 8 octets). The remaining bits form a big-endian value.
//! A value whose bits are all ones is reserved as the "unknown" sentinel.
//!
//! ```text
//! 1xxx xxxx                                  1 octet,  7 value bits
//! 01xx xxxx  xxxx xxxx                       2 octets, 14 value bits
//! 0000 0001  xxxx xxxx ... (6 more octets)   8 octets, 56 value bits
//! ```

use bytes::BufMut;

use crate::{Error, Result};

/// Longest encoding supported.
pub const MAX_VINT_LEN: usize = 8;

/// A decoded variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VInt {
    /// Value with the length marker removed.
    pub value: u64,
    /// Number of octets the encoding used.
    pub length: usize,
}

impl VInt {
    /// Whether the value is the all-ones "unknown" sentinel for its length.
    pub fn is_unknown(&self) -> bool {
        self.value == max_value(self.length)
    }

    /// The value, or `None` for the unknown sentinel.
    pub fn known(&self) -> Option<u64> {
        (!self.is_unknown()).then_some(self.value)
    }
}

/// All-ones value for an encoding of `len` octets.
pub fn max_value(len: usize) -> u64 {
    (1u64 << (7 * len)) - 1
}

/// Encoded length implied by the first octet, or `None` for a zero octet.
pub fn length_from_first_byte(first: u8) -> Option<usize> {
    match first.leading_zeros() as usize {
        n if n < MAX_VINT_LEN => Some(n + 1),
        _ => None,
    }
}

/// Smallest length that can carry `value` without colliding with the sentinel.
pub fn width(value: u64) -> usize {
    (1..=MAX_VINT_LEN)
        .find(|&len| value < max_value(len))
        .unwrap_or(MAX_VINT_LEN + 1)
}

/// Decode a variable-length integer from the start of `bytes`.
///
/// Returns `None` when the first octet is zero or the buffer is too short.
pub fn decode(bytes: &[u8]) -> Option<VInt> {
    let first = *bytes.first()?;
    let length = length_from_first_byte(first)?;
    if bytes.len() < length {
        return None;
    }

    let marker_mask = if length == MAX_VINT_LEN {
        0
    } else {
        0xFFu8 >> length
    };
    let mut value = (first & marker_mask) as u64;
    for &b in &bytes[1..length] {
        value = (value << 8) | b as u64;
    }

    Some(VInt { value, length })
}

/// Encode `value` using at least `min_len` octets.
///
/// `min_len` of 0 or 1 picks the minimal width. Returns the number of octets
/// written.
pub fn put<B: BufMut>(buf: &mut B, value: u64, min_len: usize) -> Result<usize> {
    if min_len > MAX_VINT_LEN {
        return Err(Error::unsupported(format!(
            "variable-length integer of {min_len} octets"
        )));
    }

    let length = width(value).max(min_len);
    if length > MAX_VINT_LEN {
        return Err(Error::unsupported(format!(
            "value {value} does not fit an 8-octet variable-length integer"
        )));
    }

    let marked = value | (1u64 << (7 * length));
    let bytes = marked.to_be_bytes();
    buf.put_slice(&bytes[MAX_VINT_LEN - length..]);
    Ok(length)
}

/// Encode the all-ones "unknown" sentinel in `len` octets.
pub fn put_unknown<B: BufMut>(buf: &mut B, len: usize) -> Result<()> {
    if len == 0 || len > MAX_VINT_LEN {
        return Err(Error::unsupported(format!(
            "unknown-size sentinel of {len} octets"
        )));
    }
    let marked = max_value(len) | (1u64 << (7 * len));
    buf.put_slice(&marked.to_be_bytes()[MAX_VINT_LEN - len..]);
    Ok(())
}

/// Encode into a fresh vector; convenience for tests and small headers.
pub fn encode(value: u64, min_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(MAX_VINT_LEN);
    put(&mut out, value, min_len)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_widths() {
        assert_eq!(width(0), 1);
        assert_eq!(width(126), 1);
        // 127 is the 1-octet sentinel.
        assert_eq!(width(127), 2);
        assert_eq!(width(16382), 2);
        assert_eq!(width(16383), 3);
        assert_eq!(width(1u64 << 33), 5);
    }

    #[test]
    fn test_round_trip_minimal_and_forced() {
        for size in [0u64, 127, 128, 16383, 16384, 1u64 << 33] {
            for min_len in [0usize, 8] {
                let encoded = encode(size, min_len).unwrap();
                let decoded = decode(&encoded).unwrap();
                assert_eq!(decoded.value, size, "size {size} min_len {min_len}");
                assert_eq!(decoded.length, encoded.len());
                assert!(!decoded.is_unknown());
            }
        }
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(1, 0).unwrap(), vec![0x81]);
        assert_eq!(encode(128, 0).unwrap(), vec![0x40, 0x80]);
        assert_eq!(encode(5, 4).unwrap(), vec![0x10, 0x00, 0x00, 0x05]);
    }

    #[test]
    fn test_unknown_sentinel_every_width() {
        for len in 1..=MAX_VINT_LEN {
            let mut buf = Vec::new();
            put_unknown(&mut buf, len).unwrap();
            assert_eq!(buf.len(), len);
            let decoded = decode(&buf).unwrap();
            assert!(decoded.is_unknown());
            assert_eq!(decoded.known(), None);
        }
        let mut buf = Vec::new();
        put_unknown(&mut buf, 8).unwrap();
        assert_eq!(buf, vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_decode_rejects_zero_and_short() {
        assert!(decode(&[0x00, 0x01]).is_none());
        assert!(decode(&[0x40]).is_none());
        assert!(decode(&[]).is_none());
    }

    #[test]
    fn test_oversized_value_rejected() {
        assert!(encode(max_value(8), 0).is_err());
        assert!(encode(1, 9).is_err());
    }
}
