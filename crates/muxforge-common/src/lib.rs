//! Muxforge-Common: shared types and errors.
//!
//! This crate provides the vocabulary exchanged across the demux/mux boundary:
//!
//! - **Track IDs**: 1-based, monotonically assigned identifiers
//! - **Track configuration**: video, audio and subtitle parameters plus codec
//! - **Encoded packets**: opaque payload bytes with timing and keyframe flag
//! - **Error handling**: the unified error type and result alias
//!
//! # Examples
//!
//! ```
//! use muxforge_common::{AudioConfig, Codec, EncodedPacket, TrackId};
//!
//! let config = AudioConfig::new(Codec::Aac, 48_000, 2);
//! assert_eq!(config.sample_rate, 48_000);
//!
//! let packet = EncodedPacket::new(TrackId::new(1), vec![0u8; 4], 0.0);
//! assert!(packet.is_keyframe);
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::TrackId;
pub use types::*;
