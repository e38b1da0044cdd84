//! Byte sinks.
//!
//! A [`Target`] receives flushed chunks from a [`Writer`](crate::Writer)
//! together with the absolute offset they belong at. Random-access targets
//! accept any offset, which is how placeholders get patched; streaming
//! targets only accept the next sequential offset.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use bytes::Bytes;

use crate::{Error, Result};

/// Sink for written bytes.
#[async_trait]
pub trait Target: Send {
    /// Store `bytes` at absolute `offset`.
    async fn write(&mut self, bytes: &[u8], offset: u64) -> Result<()>;

    /// Called once after the last write.
    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether writes at earlier offsets are accepted.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Release underlying resources.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BufferTarget
// ---------------------------------------------------------------------------

/// Random-access in-memory target.
///
/// The bytes remain reachable through a [`BufferHandle`] after the target has
/// been moved into a writer or muxer.
#[derive(Debug, Default)]
pub struct BufferTarget {
    buf: Arc<Mutex<Vec<u8>>>,
}

/// Shared view of a [`BufferTarget`]'s contents.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for reading the contents later.
    pub fn handle(&self) -> BufferHandle {
        BufferHandle {
            buf: Arc::clone(&self.buf),
        }
    }
}

impl BufferHandle {
    /// Snapshot of everything written so far.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf.lock())
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

#[async_trait]
impl Target for BufferTarget {
    async fn write(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();
        let mut buf = self.buf.lock();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTarget
// ---------------------------------------------------------------------------

/// Target writing to a file on disk.
#[derive(Debug)]
pub struct FileTarget {
    file: File,
    pos: u64,
}

impl FileTarget {
    /// Create (or truncate) a file for writing.
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).await?;
        Ok(Self { file, pos: 0 })
    }
}

#[async_trait]
impl Target for FileTarget {
    async fn write(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        if offset != self.pos {
            self.file.seek(SeekFrom::Start(offset)).await?;
        }
        self.file.write_all(bytes).await?;
        self.pos = offset + bytes.len() as u64;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StreamTarget
// ---------------------------------------------------------------------------

/// Forward-only target over an async writer.
///
/// Every write must start exactly where the previous one ended.
#[derive(Debug)]
pub struct StreamTarget<W> {
    inner: W,
    written: u64,
}

impl<W> StreamTarget<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> Target for StreamTarget<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        if offset != self.written {
            return Err(Error::NonSequentialWrite {
                offset,
                expected: self.written,
            });
        }
        self.inner.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
