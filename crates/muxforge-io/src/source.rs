//! Byte-range providers.
//!
//! A [`Source`] answers two questions: how long is the input (if known), and
//! what bytes live at a given offset. Implementations return short slices at
//! the end of the input and `None` once the offset is at or past it.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::{Result, Slice};

/// Chunk size used when pulling from an unbounded stream.
const STREAM_READ_CHUNK: usize = 64 * 1024;

/// Provider of byte ranges.
#[async_trait]
pub trait Source: Send + Sync {
    /// Total length in bytes, or `None` while it is unknown (streaming input).
    async fn size(&self) -> Result<Option<u64>>;

    /// Read up to `len` bytes at `offset`.
    ///
    /// The slice is shorter than `len` only at the end of the input; `None`
    /// means `offset` is at or past the end.
    async fn read_slice(&self, offset: u64, len: usize) -> Result<Option<Slice>>;

    /// Release underlying resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BufferSource
// ---------------------------------------------------------------------------

/// Source over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct BufferSource {
    data: Bytes,
}

impl BufferSource {
    /// Wrap an in-memory buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl Source for BufferSource {
    async fn size(&self) -> Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    async fn read_slice(&self, offset: u64, len: usize) -> Result<Option<Slice>> {
        let size = self.data.len() as u64;
        if offset >= size {
            return Ok(None);
        }
        let start = offset as usize;
        let end = (offset + len as u64).min(size) as usize;
        Ok(Some(Slice::new(offset, self.data.slice(start..end))))
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Source backed by a file on disk.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    /// Open a file for reading.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

#[async_trait]
impl Source for FileSource {
    async fn size(&self) -> Result<Option<u64>> {
        Ok(Some(self.size))
    }

    async fn read_slice(&self, offset: u64, len: usize) -> Result<Option<Slice>> {
        if offset >= self.size {
            return Ok(None);
        }
        let len = len.min((self.size - offset) as usize);

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = BytesMut::with_capacity(len);
        while buf.len() < len {
            let read = (&mut *file).take((len - buf.len()) as u64).read_buf(&mut buf).await?;
            if read == 0 {
                break;
            }
        }

        Ok(Some(Slice::new(offset, buf.freeze())))
    }
}

// ---------------------------------------------------------------------------
// StreamSource
// ---------------------------------------------------------------------------

struct StreamState<R> {
    inner: R,
    buffered: BytesMut,
    eof: bool,
}

/// Source over a forward-only byte stream of unknown length.
///
/// Bytes pulled from the stream stay buffered, so any offset already seen can
/// be read again. The size stays `None` until the stream reports EOF.
pub struct StreamSource<R> {
    state: Mutex<StreamState<R>>,
}

impl<R> StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wrap an async reader.
    pub fn new(inner: R) -> Self {
        Self {
            state: Mutex::new(StreamState {
                inner,
                buffered: BytesMut::new(),
                eof: false,
            }),
        }
    }
}

#[async_trait]
impl<R> Source for StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn size(&self) -> Result<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state.eof.then_some(state.buffered.len() as u64))
    }

    async fn read_slice(&self, offset: u64, len: usize) -> Result<Option<Slice>> {
        let mut state = self.state.lock().await;
        let wanted = offset + len as u64;

        while !state.eof && (state.buffered.len() as u64) < wanted {
            let StreamState {
                inner, buffered, ..
            } = &mut *state;
            buffered.reserve(STREAM_READ_CHUNK);
            if inner.read_buf(buffered).await? == 0 {
                state.eof = true;
            }
        }

        let available = state.buffered.len() as u64;
        if offset >= available {
            return Ok(None);
        }
        let end = wanted.min(available) as usize;
        let bytes = Bytes::copy_from_slice(&state.buffered[offset as usize..end]);
        Ok(Some(Slice::new(offset, bytes)))
    }
}
