//! Muxforge-IO: byte sources, byte sinks and cursor-based binary codecs.
//!
//! This crate is the bottom layer every container codec builds on.
//!
//! # Modules
//!
//! - `source` - Byte-range providers ([`BufferSource`], [`FileSource`], [`StreamSource`])
//! - `slice` - Immutable byte ranges materialized from a source
//! - `reader` - Cursor over a source with a single cached slice and primitive decoders
//! - `target` - Byte sinks ([`BufferTarget`], [`FileTarget`], [`StreamTarget`])
//! - `writer` - Sequential cursor with a staging buffer flushing into a target
//! - `vint` - EBML-style variable-length integer encoding
//!
//! # Architecture
//!
//! Reads are lazy: seeking a [`Reader`] only moves its cursor, and a source is
//! asked for bytes only when a primitive read finds the cached slice does not
//! cover the cursor. Writes are batched: a [`Writer`] accumulates bytes in a
//! fixed-size staging buffer and hands whole chunks to its target, or keeps
//! them in memory when no target was supplied.

pub mod reader;
pub mod slice;
pub mod source;
pub mod target;
pub mod vint;
pub mod writer;

pub use muxforge_common::{Error, Result};
pub use reader::{Reader, ReaderOptions, TextEncoding};
pub use slice::Slice;
pub use source::{BufferSource, FileSource, Source, StreamSource};
pub use target::{BufferHandle, BufferTarget, FileTarget, StreamTarget, Target};
pub use vint::VInt;
pub use writer::{Writer, WriterOptions};
