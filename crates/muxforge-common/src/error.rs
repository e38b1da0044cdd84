//! Unified error type for muxforge.
//!
//! Failures fall into four families: malformed input ([`Error::Format`]),
//! caller bugs ([`Error::InvalidState`], [`Error::UnknownTrack`]), exhausted or
//! failing I/O ([`Error::UnexpectedEof`], [`Error::Io`]) and sink contract
//! violations ([`Error::NonSequentialWrite`]). Nothing in this workspace
//! retries on any of them.

use crate::TrackId;

/// Error type covering all failure modes in muxforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Mandatory structural data is absent or contradictory.
    #[error("Invalid {format}: {message}")]
    Format {
        /// Container format being parsed (e.g. "FLAC", "WAV").
        format: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// The API was used in a way its lifecycle does not allow.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A packet referenced a track id that was never assigned.
    #[error("Unknown track id {0}")]
    UnknownTrack(TrackId),

    /// The source ended before the requested bytes could be read.
    #[error("Unexpected end of data at offset {offset}: needed {needed} bytes")]
    UnexpectedEof {
        /// Byte offset of the failed read.
        offset: u64,
        /// Number of bytes requested.
        needed: usize,
    },

    /// A sequential-only target received a write at a different offset.
    #[error("Non-sequential write at offset {offset}, expected {expected}")]
    NonSequentialWrite {
        /// Offset of the rejected write.
        offset: u64,
        /// Offset the target expected next.
        expected: u64,
    },

    /// The input uses a feature this crate does not handle.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::Format`].
    pub fn format(format: &'static str, message: impl Into<String>) -> Self {
        Error::Format {
            format,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Convenience constructor for [`Error::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Whether this error signals the end of the available data.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::UnexpectedEof { .. })
    }

    /// Whether this error is a caller bug rather than a data or I/O problem.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::InvalidState(_) | Error::UnknownTrack(_))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
