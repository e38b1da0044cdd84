//! WebM muxing.
//!
//! Output layout:
//!
//! ```text
//! EBML header (DocType "webm")
//! Segment (8-octet size, unknown until the trailer)
//!   Info      TimestampScale = 1 ms, Duration placeholder
//!   Tracks
//!   Cluster*  Timestamp + SimpleBlock*
//!   Cues
//! ```
//!
//! Only one cluster is held in memory at a time. It is written when the next
//! packet falls more than the cluster threshold after its first packet, or at
//! the trailer.

mod muxer;

pub use muxer::WebmMuxer;

use serde::{Deserialize, Serialize};

/// Options for WebM muxing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebmOptions {
    /// Longest span of one cluster, in milliseconds.
    pub cluster_threshold_ms: u64,
    /// Written as both MuxingApp and WritingApp.
    pub muxing_app: String,
}

impl Default for WebmOptions {
    fn default() -> Self {
        Self {
            cluster_threshold_ms: 5000,
            muxing_app: format!("muxforge-{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
