//! Sequential binary writer with a staging buffer.
//!
//! Bytes accumulate in a fixed-capacity staging buffer and are flushed to the
//! [`Target`] as one chunk at the offset where staging began. Payloads at least
//! as large as the staging buffer skip it entirely. Without a target, flushed
//! chunks are kept in memory and [`Writer::finalize`] stitches them together.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::target::Target;
use crate::vint;
use crate::{Error, Result};

/// Tuning knobs for [`Writer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Staging buffer capacity in bytes.
    pub staging_buffer_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            staging_buffer_size: 64 * 1024,
        }
    }
}

/// Binary writer over an optional [`Target`].
pub struct Writer {
    target: Option<Box<dyn Target>>,
    staging: BytesMut,
    /// Offset of the first staged byte. Always `pos - staging.len()`.
    staging_start: u64,
    capacity: usize,
    /// Flushed chunks when running without a target.
    chunks: Vec<(u64, Bytes)>,
    pos: u64,
    high_water: u64,
    finalized: bool,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("pos", &self.pos)
            .field("staged", &self.staging.len())
            .field("has_target", &self.target.is_some())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// In-memory writer; [`finalize`](Self::finalize) returns the output.
    pub fn new() -> Self {
        Self::with_options(None, WriterOptions::default())
    }

    /// Writer flushing into `target`.
    pub fn with_target(target: Box<dyn Target>) -> Self {
        Self::with_options(Some(target), WriterOptions::default())
    }

    pub fn with_options(target: Option<Box<dyn Target>>, options: WriterOptions) -> Self {
        let capacity = options.staging_buffer_size.max(1);
        Self {
            target,
            staging: BytesMut::with_capacity(capacity),
            staging_start: 0,
            capacity,
            chunks: Vec::new(),
            pos: 0,
            high_water: 0,
            finalized: false,
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// One past the highest offset written so far.
    pub fn end(&self) -> u64 {
        self.high_water.max(self.pos)
    }

    /// Whether [`seek`](Self::seek) to an earlier offset is possible.
    pub fn is_seekable(&self) -> bool {
        self.target.as_ref().map_or(true, |t| t.is_seekable())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn check_open(&self) -> Result<()> {
        if self.finalized {
            Err(Error::invalid_state("writer already finalized"))
        } else {
            Ok(())
        }
    }

    async fn emit(&mut self, offset: u64, chunk: Bytes) -> Result<()> {
        trace!(offset, len = chunk.len(), "flushing chunk");
        match self.target.as_mut() {
            Some(target) => target.write(&chunk, offset).await,
            None => {
                self.chunks.push((offset, chunk));
                Ok(())
            }
        }
    }

    /// Hand the staged bytes to the target.
    pub async fn flush(&mut self) -> Result<()> {
        if self.staging.is_empty() {
            return Ok(());
        }
        let chunk = self.staging.split().freeze();
        let offset = self.staging_start;
        self.staging_start = self.pos;
        self.emit(offset, chunk).await
    }

    /// Move the cursor, flushing staged bytes first.
    ///
    /// Moving anywhere but the current position requires a seekable target.
    pub async fn seek(&mut self, pos: u64) -> Result<()> {
        self.check_open()?;
        if pos == self.pos {
            return Ok(());
        }
        if !self.is_seekable() {
            return Err(Error::unsupported(format!(
                "seek to {pos} on a non-seekable target"
            )));
        }
        self.flush().await?;
        self.high_water = self.high_water.max(self.pos);
        self.pos = pos;
        self.staging_start = pos;
        Ok(())
    }

    /// Write raw bytes at the cursor.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.check_open()?;
        if data.is_empty() {
            return Ok(());
        }

        if data.len() >= self.capacity {
            self.flush().await?;
            let offset = self.pos;
            self.pos += data.len() as u64;
            self.staging_start = self.pos;
            return self.emit(offset, Bytes::copy_from_slice(data)).await;
        }

        if self.staging.len() + data.len() > self.capacity {
            self.flush().await?;
        }
        self.staging.extend_from_slice(data);
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write an owned buffer; large buffers are handed over without copying.
    pub async fn write_owned(&mut self, data: Bytes) -> Result<()> {
        self.check_open()?;
        if data.len() < self.capacity {
            return self.write_bytes(&data).await;
        }
        self.flush().await?;
        let offset = self.pos;
        self.pos += data.len() as u64;
        self.staging_start = self.pos;
        self.emit(offset, data).await
    }

    // -----------------------------------------------------------------------
    // Primitives
    // -----------------------------------------------------------------------

    pub async fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v]).await
    }

    pub async fn write_u16_be(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u16_le(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()).await
    }

    pub async fn write_i16_be(&mut self, v: i16) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u24_be(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()[1..]).await
    }

    pub async fn write_u24_le(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()[..3]).await
    }

    pub async fn write_u32_be(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u32_le(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()).await
    }

    pub async fn write_u64_be(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()).await
    }

    pub async fn write_f32_be(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_f32_le(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()).await
    }

    pub async fn write_f64_be(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_f64_le(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes()).await
    }

    pub async fn write_fourcc(&mut self, code: &[u8; 4]) -> Result<()> {
        self.write_bytes(code).await
    }

    /// Write the UTF-8 bytes of `s` without a terminator.
    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes()).await
    }

    /// Write an EBML element ID; the marker bit is part of `id`.
    pub async fn write_ebml_id(&mut self, id: u32) -> Result<()> {
        let bytes = id.to_be_bytes();
        let skip = (id.leading_zeros() / 8).min(3) as usize;
        self.write_bytes(&bytes[skip..]).await
    }

    /// Write an EBML variable-length integer of at least `min_len` octets.
    pub async fn write_ebml_vint(&mut self, value: u64, min_len: usize) -> Result<()> {
        let mut buf = Vec::with_capacity(vint::MAX_VINT_LEN);
        vint::put(&mut buf, value, min_len)?;
        self.write_bytes(&buf).await
    }

    /// Write the all-ones "unknown size" sentinel in `len` octets.
    pub async fn write_ebml_unknown_size(&mut self, len: usize) -> Result<()> {
        let mut buf = Vec::with_capacity(len);
        vint::put_unknown(&mut buf, len)?;
        self.write_bytes(&buf).await
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Flush, finalize the target and return the output.
    ///
    /// With a target the returned buffer is empty; the target owns the bytes.
    /// Without one, the flushed chunks are laid out by offset, so bytes
    /// written after a seek replace the earlier ones.
    pub async fn finalize(&mut self) -> Result<Bytes> {
        self.check_open()?;
        self.flush().await?;
        self.finalized = true;

        if let Some(target) = self.target.as_mut() {
            target.finalize().await?;
            return Ok(Bytes::new());
        }

        let total = self
            .chunks
            .iter()
            .map(|(offset, chunk)| offset + chunk.len() as u64)
            .max()
            .unwrap_or(0) as usize;

        if let [(0, only)] = self.chunks.as_slice() {
            let only = only.clone();
            self.chunks.clear();
            return Ok(only);
        }

        let mut out = vec![0u8; total];
        for (offset, chunk) in self.chunks.drain(..) {
            let start = offset as usize;
            out[start..start + chunk.len()].copy_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }

    /// Close the target, if any.
    pub async fn close(&mut self) -> Result<()> {
        match self.target.as_mut() {
            Some(target) => target.close().await,
            None => Ok(()),
        }
    }
}
