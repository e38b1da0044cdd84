//! Immutable byte ranges read from a [`Source`](crate::Source).

use bytes::Bytes;

/// The bytes of `[start, start + len)` of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    start: u64,
    bytes: Bytes,
}

impl Slice {
    /// Wrap bytes that were read at `start`.
    pub fn new(start: u64, bytes: impl Into<Bytes>) -> Self {
        Self {
            start,
            bytes: bytes.into(),
        }
    }

    /// Offset of the first byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    /// Number of bytes held.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the slice holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `[pos, pos + n)` lies entirely inside this slice.
    pub fn covers(&self, pos: u64, n: usize) -> bool {
        pos >= self.start && pos + n as u64 <= self.end()
    }

    /// Zero-copy view of `[pos, pos + n)`.
    ///
    /// Returns `None` when the range is not covered.
    pub fn range(&self, pos: u64, n: usize) -> Option<Bytes> {
        if !self.covers(pos, n) {
            return None;
        }
        let from = (pos - self.start) as usize;
        Some(self.bytes.slice(from..from + n))
    }

    /// All bytes of the slice.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the slice, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds() {
        let slice = Slice::new(100, vec![1u8, 2, 3, 4]);
        assert_eq!(slice.start(), 100);
        assert_eq!(slice.end(), 104);
        assert!(slice.covers(100, 4));
        assert!(slice.covers(102, 2));
        assert!(!slice.covers(99, 1));
        assert!(!slice.covers(103, 2));
    }

    #[test]
    fn test_slice_range() {
        let slice = Slice::new(10, vec![9u8, 8, 7, 6]);
        assert_eq!(slice.range(11, 2).as_deref(), Some(&[8u8, 7][..]));
        assert!(slice.range(13, 2).is_none());
    }
}
