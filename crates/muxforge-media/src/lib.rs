//! Muxforge-Media: demux/mux framework and container codecs.
//!
//! # Modules
//!
//! - [`demuxer`] - Format sniffing, the scan-once [`Demuxer`] and the frame-table lookup
//! - [`muxer`] - The lock-serialized [`Muxer`] and the per-format [`FormatMuxer`] hooks
//! - [`frame_table`] - Immutable per-frame index built by a scan
//! - [`ebml`] - EBML element IDs, header reading and element building
//! - [`adts`] - ADTS framed AAC
//! - [`mp3`] - MPEG-1/2/2.5 audio layers I-III
//! - [`flac`] - Native FLAC streams
//! - [`wav`] - RIFF/WAVE PCM
//! - [`matroska`] - Matroska/WebM demuxing
//! - [`webm`] - WebM muxing with time-bounded clusters
//!
//! # Architecture
//!
//! Demuxing is two-phase. A format scanner makes one offset-ordered pass over
//! the source and records every frame's offset, size and timing in a
//! [`FrameTable`]; packets are then read by table lookup, so random access and
//! seeking never rescan the stream.
//!
//! Muxing is push-based. The [`Muxer`] owns a
//! [`Writer`](muxforge_io::Writer) and dispatches each packet to the format's
//! hooks under one async lock; the first packet writes the header and
//! `finalize` writes the trailer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use muxforge_io::BufferSource;
//! use muxforge_media::Demuxer;
//!
//! # async fn run(bytes: Vec<u8>) -> muxforge_media::Result<()> {
//! let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(bytes)));
//! let tracks = demuxer.tracks().await?.to_vec();
//! while let Some(packet) = demuxer.read_packet(tracks[0].id).await? {
//!     println!("{:.3}s {} bytes", packet.timestamp, packet.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod adts;
pub mod demuxer;
pub mod ebml;
pub mod flac;
pub mod frame_table;
pub(crate) mod framing;
pub mod matroska;
pub mod mp3;
pub mod muxer;
pub mod wav;
pub mod webm;

pub use muxforge_common::{Error, Result};

pub use demuxer::{Demuxer, DemuxerOptions, DemuxerState, FormatScanner, InputFormat, ScanResult};
pub use frame_table::{FrameEntry, FrameTable, FrameTableBuilder};
pub use muxer::{FormatMuxer, Muxer, MuxerOptions, MuxerPhase, OutputFormat};
pub use wav::WavOptions;
pub use webm::WebmOptions;
