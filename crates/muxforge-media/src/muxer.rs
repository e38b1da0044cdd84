//! Format-independent muxer.
//!
//! A [`Muxer`] owns a [`Writer`] and one format implementation. Tracks are
//! registered while the muxer is building; the first packet (or an explicit
//! [`Muxer::start`]) writes the container header, after which the track set
//! is frozen. All entry points take `&self` and serialize on one FIFO-fair
//! async lock, so a muxer can be shared across tasks without partial writes
//! interleaving.
//!
//! ```text
//! Building --start / first packet--> Started --finalize--> Finalized --close--> Closed
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use muxforge_common::{
    AudioConfig, EncodedPacket, SubtitleConfig, Track, TrackConfig, TrackId, TrackType,
    VideoConfig,
};
use muxforge_io::{Target, Writer, WriterOptions};

use crate::adts::AdtsMuxer;
use crate::flac::FlacMuxer;
use crate::mp3::Mp3Muxer;
use crate::wav::WavMuxer;
use crate::webm::{WebmMuxer, WebmOptions};
use crate::{Error, Result};

/// Per-format hooks driven by [`Muxer`].
///
/// Packet timestamps handed to the hooks are already rebased so the first
/// packet of the output is at 0.
#[async_trait]
pub trait FormatMuxer: Send {
    fn name(&self) -> &'static str;

    /// Reject a track the format cannot carry.
    fn check_track(&self, _existing: &[Track], _config: &TrackConfig) -> Result<()> {
        Ok(())
    }

    async fn write_header(&mut self, writer: &mut Writer, tracks: &[Track]) -> Result<()>;

    async fn write_video_packet(
        &mut self,
        _writer: &mut Writer,
        _track: &Track,
        _packet: &EncodedPacket,
    ) -> Result<()> {
        Err(Error::unsupported(format!("video in {}", self.name())))
    }

    async fn write_audio_packet(
        &mut self,
        _writer: &mut Writer,
        _track: &Track,
        _packet: &EncodedPacket,
    ) -> Result<()> {
        Err(Error::unsupported(format!("audio in {}", self.name())))
    }

    async fn write_subtitle_packet(
        &mut self,
        _writer: &mut Writer,
        _track: &Track,
        _packet: &EncodedPacket,
    ) -> Result<()> {
        Err(Error::unsupported(format!("subtitles in {}", self.name())))
    }

    async fn write_trailer(&mut self, writer: &mut Writer, tracks: &[Track]) -> Result<()>;
}

/// Container formats the muxer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Adts,
    Mp3,
    Flac,
    Wav,
    Webm,
}

/// Options for a [`Muxer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxerOptions {
    pub writer: WriterOptions,
    pub webm: WebmOptions,
}

/// Lifecycle of a [`Muxer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerPhase {
    Building,
    Started,
    Finalized,
    Closed,
}

enum FormatImpl {
    Adts(AdtsMuxer),
    Mp3(Mp3Muxer),
    Flac(FlacMuxer),
    Wav(WavMuxer),
    Webm(WebmMuxer),
}

impl FormatImpl {
    fn new(format: OutputFormat, options: &MuxerOptions) -> Self {
        match format {
            OutputFormat::Adts => FormatImpl::Adts(AdtsMuxer::new()),
            OutputFormat::Mp3 => FormatImpl::Mp3(Mp3Muxer::new()),
            OutputFormat::Flac => FormatImpl::Flac(FlacMuxer::new()),
            OutputFormat::Wav => FormatImpl::Wav(WavMuxer::new()),
            OutputFormat::Webm => FormatImpl::Webm(WebmMuxer::new(options.webm.clone())),
        }
    }

    fn get(&self) -> &dyn FormatMuxer {
        match self {
            FormatImpl::Adts(m) => m,
            FormatImpl::Mp3(m) => m,
            FormatImpl::Flac(m) => m,
            FormatImpl::Wav(m) => m,
            FormatImpl::Webm(m) => m,
        }
    }

    fn get_mut(&mut self) -> &mut dyn FormatMuxer {
        match self {
            FormatImpl::Adts(m) => m,
            FormatImpl::Mp3(m) => m,
            FormatImpl::Flac(m) => m,
            FormatImpl::Wav(m) => m,
            FormatImpl::Webm(m) => m,
        }
    }
}

struct MuxerState {
    phase: MuxerPhase,
    writer: Writer,
    tracks: Vec<Track>,
    next_id: TrackId,
    /// Timestamp of the first packet written, subtracted from every packet.
    epoch: Option<f64>,
    format: FormatImpl,
    packets: u64,
}

impl MuxerState {
    async fn ensure_started(&mut self) -> Result<()> {
        match self.phase {
            MuxerPhase::Started => Ok(()),
            MuxerPhase::Finalized | MuxerPhase::Closed => {
                Err(Error::invalid_state("muxer already finalized"))
            }
            MuxerPhase::Building => {
                if self.tracks.is_empty() {
                    return Err(Error::invalid_state("cannot start a muxer without tracks"));
                }
                self.format
                    .get_mut()
                    .write_header(&mut self.writer, &self.tracks)
                    .await?;
                self.phase = MuxerPhase::Started;
                debug!(
                    format = self.format.get().name(),
                    tracks = self.tracks.len(),
                    "muxer started"
                );
                Ok(())
            }
        }
    }
}

/// Muxer writing one container to a target or to memory.
pub struct Muxer {
    state: Mutex<MuxerState>,
}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer").finish_non_exhaustive()
    }
}

impl Muxer {
    /// Muxer writing to `target`, or into memory when `target` is `None`.
    pub fn new(format: OutputFormat, target: Option<Box<dyn Target>>) -> Self {
        Self::with_options(format, target, MuxerOptions::default())
    }

    pub fn with_options(
        format: OutputFormat,
        target: Option<Box<dyn Target>>,
        options: MuxerOptions,
    ) -> Self {
        let format_impl = FormatImpl::new(format, &options);
        Self {
            state: Mutex::new(MuxerState {
                phase: MuxerPhase::Building,
                writer: Writer::with_options(target, options.writer),
                tracks: Vec::new(),
                next_id: TrackId::new(1),
                epoch: None,
                format: format_impl,
                packets: 0,
            }),
        }
    }

    pub async fn phase(&self) -> MuxerPhase {
        self.state.lock().await.phase
    }

    /// Snapshot of the registered tracks.
    pub async fn tracks(&self) -> Vec<Track> {
        self.state.lock().await.tracks.clone()
    }

    /// Register a track of any kind, as when copying tracks from a demuxer.
    pub async fn add_track(&self, config: TrackConfig) -> Result<TrackId> {
        let mut state = self.state.lock().await;
        if state.phase != MuxerPhase::Building {
            return Err(Error::invalid_state(
                "tracks cannot be added after the muxer has started",
            ));
        }
        state.format.get().check_track(&state.tracks, &config)?;

        let id = state.next_id;
        state.next_id = id.next();
        debug!(track = %id, kind = %config.track_type(), codec = %config.codec(), "track added");
        state.tracks.push(Track::new(id, config));
        Ok(id)
    }

    pub async fn add_video_track(&self, config: VideoConfig) -> Result<TrackId> {
        self.add_track(TrackConfig::Video(config)).await
    }

    pub async fn add_audio_track(&self, config: AudioConfig) -> Result<TrackId> {
        self.add_track(TrackConfig::Audio(config)).await
    }

    pub async fn add_subtitle_track(&self, config: SubtitleConfig) -> Result<TrackId> {
        self.add_track(TrackConfig::Subtitle(config)).await
    }

    /// Write the container header and freeze the track set.
    ///
    /// Calling it again once started is a no-op.
    pub async fn start(&self) -> Result<()> {
        self.state.lock().await.ensure_started().await
    }

    /// Write one packet to the track named by `packet.track_id`.
    pub async fn write_packet(&self, mut packet: EncodedPacket) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.ensure_started().await?;

        let track = state
            .tracks
            .iter()
            .find(|t| t.id == packet.track_id)
            .ok_or(Error::UnknownTrack(packet.track_id))?;

        let epoch = *state.epoch.get_or_insert(packet.timestamp);
        let rebased = packet.timestamp - epoch;
        packet.timestamp = if rebased < 0.0 {
            warn!(
                track = %packet.track_id,
                timestamp = packet.timestamp,
                epoch,
                "packet precedes the first written packet, clamping to 0"
            );
            0.0
        } else {
            rebased
        };

        let format = state.format.get_mut();
        let writer = &mut state.writer;
        match track.track_type() {
            TrackType::Video => format.write_video_packet(writer, track, &packet).await?,
            TrackType::Audio => format.write_audio_packet(writer, track, &packet).await?,
            TrackType::Subtitle => format.write_subtitle_packet(writer, track, &packet).await?,
        }
        state.packets += 1;
        Ok(())
    }

    /// Write the trailer and return the output.
    ///
    /// The returned buffer is empty when a target owns the bytes.
    pub async fn finalize(&self) -> Result<Bytes> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.ensure_started().await?;

        state
            .format
            .get_mut()
            .write_trailer(&mut state.writer, &state.tracks)
            .await?;
        let output = state.writer.finalize().await?;
        state.phase = MuxerPhase::Finalized;

        info!(
            format = state.format.get().name(),
            packets = state.packets,
            bytes = state.writer.end(),
            "muxer finalized"
        );
        Ok(output)
    }

    /// Release the target. Further calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.phase == MuxerPhase::Closed {
            return Ok(());
        }
        state.phase = MuxerPhase::Closed;
        state.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxforge_common::Codec;

    fn aac() -> AudioConfig {
        AudioConfig::new(Codec::Aac, 48000, 2)
    }

    #[tokio::test]
    async fn test_track_ids_are_sequential() {
        let muxer = Muxer::new(OutputFormat::Webm, None);
        let v = muxer
            .add_video_track(VideoConfig::new(Codec::Vp9, 640, 360))
            .await
            .unwrap();
        let a = muxer.add_audio_track(AudioConfig::new(Codec::Opus, 48000, 2)).await.unwrap();
        assert_eq!(v, TrackId::new(1));
        assert_eq!(a, TrackId::new(2));
        assert_eq!(muxer.tracks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_add_track_after_start_fails() {
        let muxer = Muxer::new(OutputFormat::Adts, None);
        muxer.add_audio_track(aac()).await.unwrap();
        muxer.start().await.unwrap();
        assert_eq!(muxer.phase().await, MuxerPhase::Started);

        let err = muxer.add_audio_track(aac()).await.unwrap_err();
        assert!(err.is_programmer_error());
    }

    #[tokio::test]
    async fn test_unknown_track_rejected() {
        let muxer = Muxer::new(OutputFormat::Adts, None);
        muxer.add_audio_track(aac()).await.unwrap();
        let err = muxer
            .write_packet(EncodedPacket::new(TrackId::new(9), vec![1, 2, 3], 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTrack(id) if id == TrackId::new(9)));
    }

    #[tokio::test]
    async fn test_write_after_finalize_fails() {
        let muxer = Muxer::new(OutputFormat::Adts, None);
        let id = muxer.add_audio_track(aac()).await.unwrap();
        muxer
            .write_packet(EncodedPacket::new(id, vec![0u8; 8], 0.0))
            .await
            .unwrap();
        let out = muxer.finalize().await.unwrap();
        assert_eq!(out.len(), 15);

        let err = muxer
            .write_packet(EncodedPacket::new(id, vec![0u8; 8], 0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(muxer.finalize().await.is_err());

        muxer.close().await.unwrap();
        assert_eq!(muxer.phase().await, MuxerPhase::Closed);
    }

    #[tokio::test]
    async fn test_start_without_tracks_fails() {
        let muxer = Muxer::new(OutputFormat::Wav, None);
        assert!(matches!(
            muxer.start().await.unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_format_rejects_unsuitable_track() {
        let muxer = Muxer::new(OutputFormat::Adts, None);
        let err = muxer
            .add_video_track(VideoConfig::new(Codec::Avc, 1280, 720))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
