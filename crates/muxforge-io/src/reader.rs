//! Cursor-based binary reader over a [`Source`].
//!
//! The reader keeps one cached [`Slice`]. Before every primitive read it checks
//! that the slice covers `[pos, pos + n)`; if not, it replaces the slice with a
//! single fresh read from the source. Seeking and skipping never touch the
//! source.

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::vint::{self, VInt};
use crate::{Error, Result, Slice, Source};

/// Longest classic varint accepted (ten 7-bit groups cover a u64).
const MAX_VARINT_LEN: usize = 10;

/// Tuning knobs for [`Reader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Minimum number of bytes requested from the source on a cache miss.
    pub prefetch_bytes: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            prefetch_bytes: 16 * 1024,
        }
    }
}

/// Character encoding for string reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// 7-bit ASCII; other bytes become U+FFFD.
    Ascii,
    /// UTF-8, invalid sequences replaced lossily.
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Binary reader with a cursor and a single cached slice.
pub struct Reader {
    source: Arc<dyn Source>,
    pos: u64,
    cached: Option<Slice>,
    options: ReaderOptions,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("pos", &self.pos)
            .field("cached", &self.cached.as_ref().map(|s| s.start()..s.end()))
            .finish()
    }
}

impl Reader {
    /// Create a reader positioned at offset 0.
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Create a reader with explicit options.
    pub fn with_options(source: Arc<dyn Source>, options: ReaderOptions) -> Self {
        Self {
            source,
            pos: 0,
            cached: None,
            options,
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Advance the cursor by `n` bytes.
    pub fn skip(&mut self, n: u64) {
        self.pos += n;
    }

    /// Total length of the source, if known.
    pub async fn size(&self) -> Result<Option<u64>> {
        self.source.size().await
    }

    /// Whether `n` bytes are available at the cursor.
    ///
    /// Loads a new slice on a cache miss; returns `false` at end of input
    /// instead of failing.
    pub async fn has_bytes(&mut self, n: usize) -> Result<bool> {
        if self.is_cached(n) {
            return Ok(true);
        }
        let len = n.max(self.options.prefetch_bytes);
        self.cached = self.source.read_slice(self.pos, len).await?;
        Ok(self.is_cached(n))
    }

    /// Make sure `[pos, pos + n)` is cached, failing at end of input.
    pub async fn ensure_bytes(&mut self, n: usize) -> Result<()> {
        if self.has_bytes(n).await? {
            Ok(())
        } else {
            Err(Error::UnexpectedEof {
                offset: self.pos,
                needed: n,
            })
        }
    }

    fn is_cached(&self, n: usize) -> bool {
        self.cached
            .as_ref()
            .is_some_and(|slice| slice.covers(self.pos, n))
    }

    /// Take `n` cached bytes at the cursor and advance past them.
    async fn take(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_bytes(n).await?;
        let bytes = self
            .cached
            .as_ref()
            .and_then(|slice| slice.range(self.pos, n))
            .ok_or(Error::UnexpectedEof {
                offset: self.pos,
                needed: n,
            })?;
        self.pos += n as u64;
        Ok(bytes)
    }

    async fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Run `f` and restore the cursor afterwards, whether it succeeded or not.
    ///
    /// ```ignore
    /// let magic = reader.peek(|r| Box::pin(async move { r.read_fourcc().await })).await?;
    /// ```
    pub async fn peek<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'r> FnOnce(&'r mut Reader) -> BoxFuture<'r, Result<T>>,
    {
        let saved = self.pos;
        let result = f(self).await;
        self.pos = saved;
        result
    }

    // -----------------------------------------------------------------------
    // Raw bytes
    // -----------------------------------------------------------------------

    /// Read `n` bytes.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.take(n).await
    }

    /// Read up to `n` bytes, fewer only at end of input.
    pub async fn read_up_to(&mut self, n: usize) -> Result<Bytes> {
        if !self.has_bytes(n).await? {
            // The reload in has_bytes left whatever remains before EOF cached.
            let available = self
                .cached
                .as_ref()
                .filter(|slice| slice.covers(self.pos, 0))
                .map_or(0, |slice| (slice.end() - self.pos) as usize);
            if available == 0 {
                return Ok(Bytes::new());
            }
            return self.take(available.min(n)).await;
        }
        self.take(n).await
    }

    /// Total length of the input, draining a streaming source if needed.
    ///
    /// The cursor is left where it was.
    pub async fn resolve_size(&mut self) -> Result<u64> {
        if let Some(size) = self.source.size().await? {
            return Ok(size);
        }
        let saved = self.pos;
        let step = self.options.prefetch_bytes.max(64 * 1024);
        let result = async {
            loop {
                let chunk = self.read_up_to(step).await?;
                if chunk.len() < step {
                    return Ok(self.pos);
                }
            }
        }
        .await;
        self.pos = saved;
        result
    }

    /// Read a 4-byte code such as `RIFF` or `fLaC`.
    pub async fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.take_array::<4>().await
    }

    // -----------------------------------------------------------------------
    // Integers
    // -----------------------------------------------------------------------

    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>().await?[0])
    }

    pub async fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8().await? as i8)
    }

    pub async fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array().await?))
    }

    pub async fn read_i16_be(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_i16_le(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take_array().await?))
    }

    pub async fn read_u24_be(&mut self) -> Result<u32> {
        let [a, b, c] = self.take_array::<3>().await?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub async fn read_u24_le(&mut self) -> Result<u32> {
        let [a, b, c] = self.take_array::<3>().await?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    pub async fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array().await?))
    }

    pub async fn read_i32_be(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array().await?))
    }

    /// Read an `n`-byte big-endian unsigned integer (`n` in 0..=8).
    pub async fn read_uint_be(&mut self, n: usize) -> Result<u64> {
        if n > 8 {
            return Err(Error::unsupported(format!("{n}-byte integer")));
        }
        let bytes = self.take(n).await?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    // -----------------------------------------------------------------------
    // Floats
    // -----------------------------------------------------------------------

    pub async fn read_f32_be(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array().await?))
    }

    pub async fn read_f64_be(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array().await?))
    }

    pub async fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take_array().await?))
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    /// Read a fixed-length string.
    pub async fn read_string(&mut self, len: usize, encoding: TextEncoding) -> Result<String> {
        let bytes = self.take(len).await?;
        Ok(encoding.decode(&bytes))
    }

    /// Read a string terminated by a zero byte; the terminator is consumed.
    pub async fn read_cstring(&mut self, encoding: TextEncoding) -> Result<String> {
        let mut raw = Vec::new();
        loop {
            match self.read_u8().await? {
                0 => break,
                b => raw.push(b),
            }
        }
        Ok(encoding.decode(&raw))
    }

    // -----------------------------------------------------------------------
    // Variable-length integers
    // -----------------------------------------------------------------------

    /// Read a classic varint: 7-bit groups, least significant first, high
    /// bit set on every byte except the last.
    pub async fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8().await?;
            value |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::format(
            "varint",
            format!("more than {MAX_VARINT_LEN} groups at offset {start}"),
        ))
    }

    /// Read an EBML-style variable-length integer with the marker removed.
    pub async fn read_vint(&mut self) -> Result<VInt> {
        let start = self.pos;
        self.ensure_bytes(1).await?;
        let first = self
            .cached
            .as_ref()
            .and_then(|s| s.range(start, 1))
            .map(|b| b[0])
            .unwrap_or(0);
        let length = vint::length_from_first_byte(first).ok_or_else(|| {
            Error::format(
                "EBML",
                format!("invalid variable-length integer at offset {start}"),
            )
        })?;
        let bytes = self.take(length).await?;
        vint::decode(&bytes).ok_or(Error::UnexpectedEof {
            offset: start,
            needed: length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reader(data: Vec<u8>) -> Reader {
        Reader::new(Arc::new(BufferSource::new(data)))
    }

    /// Counts source round trips.
    struct CountingSource {
        inner: BufferSource,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl Source for CountingSource {
        async fn size(&self) -> Result<Option<u64>> {
            self.inner.size().await
        }

        async fn read_slice(&self, offset: u64, len: usize) -> Result<Option<Slice>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_slice(offset, len).await
        }
    }

    #[tokio::test]
    async fn test_integers_both_endians() {
        let mut r = reader(vec![
            0x12, 0x34, // u16
            0x12, 0x34, // u16 le
            0x01, 0x02, 0x03, // u24
            0x01, 0x02, 0x03, // u24 le
            0xDE, 0xAD, 0xBE, 0xEF, // u32
            0xEF, 0xBE, 0xAD, 0xDE, // u32 le
            0, 0, 0, 0, 0, 0, 0x01, 0x00, // u64
        ]);
        assert_eq!(r.read_u16_be().await.unwrap(), 0x1234);
        assert_eq!(r.read_u16_le().await.unwrap(), 0x3412);
        assert_eq!(r.read_u24_be().await.unwrap(), 0x010203);
        assert_eq!(r.read_u24_le().await.unwrap(), 0x030201);
        assert_eq!(r.read_u32_be().await.unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_u32_le().await.unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_u64_be().await.unwrap(), 256);
        assert_eq!(r.position(), 26);
    }

    #[tokio::test]
    async fn test_floats() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_be_bytes());
        data.extend_from_slice(&(-2.25f64).to_le_bytes());
        let mut r = reader(data);
        assert_eq!(r.read_f32_be().await.unwrap(), 1.5);
        assert_eq!(r.read_f64_le().await.unwrap(), -2.25);
    }

    #[tokio::test]
    async fn test_strings() {
        let mut r = reader(b"fLaCabc\0\xE9t\xC3\xA9".to_vec());
        assert_eq!(&r.read_fourcc().await.unwrap(), b"fLaC");
        assert_eq!(r.read_cstring(TextEncoding::Ascii).await.unwrap(), "abc");
        assert_eq!(r.read_string(2, TextEncoding::Latin1).await.unwrap(), "ét");
        assert_eq!(r.read_string(2, TextEncoding::Utf8).await.unwrap(), "é");
    }

    #[tokio::test]
    async fn test_varints() {
        // 300 = 0b1_0010_1100 -> 0xAC 0x02
        let mut r = reader(vec![0xAC, 0x02, 0x42, 0x80]);
        assert_eq!(r.read_varint().await.unwrap(), 300);
        let v = r.read_vint().await.unwrap();
        assert_eq!(v.value, 0x0280);
        assert_eq!(v.length, 2);
    }

    #[tokio::test]
    async fn test_eof_is_reported() {
        let mut r = reader(vec![1, 2]);
        r.seek(1);
        let err = r.read_u32_be().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { offset: 1, needed: 4 }));
        assert!(!r.has_bytes(2).await.unwrap());
        assert!(r.has_bytes(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_peek_restores_cursor_on_success_and_error() {
        let mut r = reader(b"RIFF".to_vec());
        let magic = r
            .peek(|r| Box::pin(async move { r.read_fourcc().await }))
            .await
            .unwrap();
        assert_eq!(&magic, b"RIFF");
        assert_eq!(r.position(), 0);

        r.skip(2);
        let failed = r
            .peek(|r| Box::pin(async move { r.read_u64_be().await }))
            .await;
        assert!(failed.is_err());
        assert_eq!(r.position(), 2);
    }

    #[tokio::test]
    async fn test_read_up_to_stops_at_eof() {
        let mut r = reader(vec![1, 2, 3, 4, 5]);
        assert_eq!(r.read_up_to(2).await.unwrap().as_ref(), &[1, 2]);
        assert_eq!(r.read_up_to(100).await.unwrap().as_ref(), &[3, 4, 5]);
        assert!(r.read_up_to(1).await.unwrap().is_empty());
        assert_eq!(r.position(), 5);
    }

    #[tokio::test]
    async fn test_resolve_size_drains_stream() {
        let data: &'static [u8] = &[7u8; 1000];
        let source = Arc::new(crate::StreamSource::new(data));
        let mut r = Reader::with_options(source, ReaderOptions { prefetch_bytes: 16 });
        r.seek(10);
        assert_eq!(r.size().await.unwrap(), None);
        assert_eq!(r.resolve_size().await.unwrap(), 1000);
        assert_eq!(r.position(), 10);
    }

    #[tokio::test]
    async fn test_one_round_trip_per_cache_miss() {
        let source = Arc::new(CountingSource {
            inner: BufferSource::new(vec![0u8; 64]),
            reads: AtomicUsize::new(0),
        });
        let mut r = Reader::with_options(source.clone(), ReaderOptions { prefetch_bytes: 8 });

        r.read_u32_be().await.unwrap();
        r.read_u32_be().await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        // Seeking alone does no I/O.
        r.seek(40);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        r.read_u16_be().await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);

        // A read larger than the prefetch window still takes one request.
        r.seek(0);
        r.read_bytes(32).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 3);
    }
}
