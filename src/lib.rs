//! Muxforge - media container I/O toolkit
//!
//! Reads and writes ADTS, MPEG audio, FLAC, WAV and Matroska/WebM containers
//! through one packet-level API. This crate re-exports the building blocks
//! from the member crates and adds configuration, logging setup and a few
//! entry points that wire them together.
//!
//! ```no_run
//! use muxforge::{config, create_output, open_file, OutputFormat};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = config::load_config_or_default(None)?;
//! let mut input = open_file("in.webm", &config).await?;
//! let tracks = input.tracks().await?.to_vec();
//!
//! let output = create_output(OutputFormat::Webm, None, &config);
//! for track in &tracks {
//!     output.add_track(track.config.clone()).await?;
//! }
//! for track in &tracks {
//!     while let Some(packet) = input.read_packet(track.id).await? {
//!         output.write_packet(packet).await?;
//!     }
//! }
//! let bytes = output.finalize().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

pub use muxforge_common::{
    AudioConfig, Codec, EncodedPacket, Error, PcmFormat, Result, SubtitleConfig, Track,
    TrackConfig, TrackId, TrackType, VideoConfig,
};
pub use muxforge_io::{
    BufferSource, BufferTarget, FileSource, FileTarget, Reader, Source, StreamSource,
    StreamTarget, Target, Writer,
};
pub use muxforge_media::{
    Demuxer, DemuxerState, FrameTable, InputFormat, Muxer, MuxerPhase, OutputFormat,
};

use config::Config;

/// Demuxer over `source`; the container is sniffed on first use.
pub fn open_input(source: Arc<dyn Source>, config: &Config) -> Demuxer {
    Demuxer::with_options(source, None, config.demuxer_options())
}

/// Demuxer over the file at `path`.
pub async fn open_file(path: impl AsRef<Path>, config: &Config) -> Result<Demuxer> {
    let source = FileSource::open(path.as_ref()).await?;
    tracing::debug!(path = %path.as_ref().display(), "opened input file");
    Ok(open_input(Arc::new(source), config))
}

/// Muxer writing `format` to `target`, or into memory when `target` is `None`.
pub fn create_output(
    format: OutputFormat,
    target: Option<Box<dyn Target>>,
    config: &Config,
) -> Muxer {
    Muxer::with_options(format, target, config.muxer_options())
}

/// Muxer writing to a new file at `path`, its format chosen by extension.
pub async fn create_file(path: impl AsRef<Path>, config: &Config) -> Result<Muxer> {
    let path = path.as_ref();
    let format = output_format_for_path(path).ok_or_else(|| {
        Error::unsupported(format!("no output format for {}", path.display()))
    })?;
    let target = FileTarget::create(path).await?;
    tracing::debug!(path = %path.display(), ?format, "created output file");
    Ok(create_output(format, Some(Box::new(target)), config))
}

/// Output format conventionally named by a file extension.
pub fn output_format_for_path(path: &Path) -> Option<OutputFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "aac" | "adts" => Some(OutputFormat::Adts),
        "mp3" | "mp2" | "mp1" => Some(OutputFormat::Mp3),
        "flac" => Some(OutputFormat::Flac),
        "wav" | "wave" => Some(OutputFormat::Wav),
        "webm" => Some(OutputFormat::Webm),
        _ => None,
    }
}
