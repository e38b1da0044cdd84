use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use muxforge_common::{EncodedPacket, Track, TrackConfig};
use muxforge_io::{vint, Writer};

use super::WebmOptions;
use crate::ebml::{self, ids, track_type};
use crate::matroska::{codec_id, is_webm_codec};
use crate::muxer::FormatMuxer;
use crate::{Error, Result};

/// Nanoseconds per tick; timestamps are written in milliseconds.
const TIMESTAMP_SCALE: u64 = 1_000_000;

/// Width of the Segment size field, wide enough for any patched value.
const SEGMENT_SIZE_LEN: usize = 8;

#[derive(Debug)]
struct OpenCluster {
    start_ms: i64,
    body: BytesMut,
    blocks: usize,
}

impl OpenCluster {
    fn new(start_ms: i64) -> Result<Self> {
        let mut body = BytesMut::with_capacity(64 * 1024);
        ebml::put_uint(&mut body, ids::TIMESTAMP, start_ms as u64)?;
        Ok(Self {
            start_ms,
            body,
            blocks: 0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CuePoint {
    time_ms: u64,
    track: u64,
    /// Cluster offset relative to the Segment payload.
    cluster_position: u64,
}

/// WebM muxer with time-bounded clusters.
#[derive(Debug)]
pub struct WebmMuxer {
    options: WebmOptions,
    segment_size_offset: u64,
    segment_data_start: u64,
    /// Absolute offset of the Duration float, when one was written.
    duration_offset: Option<u64>,
    cluster: Option<OpenCluster>,
    clusters_written: usize,
    cues: Vec<CuePoint>,
    end_ms: f64,
}

impl WebmMuxer {
    pub fn new(options: WebmOptions) -> Self {
        Self {
            options,
            segment_size_offset: 0,
            segment_data_start: 0,
            duration_offset: None,
            cluster: None,
            clusters_written: 0,
            cues: Vec::new(),
            end_ms: 0.0,
        }
    }

    /// Info body, plus the offset of the Duration float within it.
    ///
    /// Duration is only written when it can be patched later; a stream
    /// target leaves it out so readers fall back to the last frame.
    fn info(&self, with_duration: bool) -> Result<(BytesMut, Option<usize>)> {
        let mut body = BytesMut::with_capacity(64);
        ebml::put_uint(&mut body, ids::TIMESTAMP_SCALE, TIMESTAMP_SCALE)?;
        ebml::put_string(&mut body, ids::MUXING_APP, &self.options.muxing_app)?;
        ebml::put_string(&mut body, ids::WRITING_APP, &self.options.muxing_app)?;
        if !with_duration {
            return Ok((body, None));
        }
        // Duration: 2-octet ID, 1-octet size, then the float.
        let duration_at = body.len() + 3;
        ebml::put_float(&mut body, ids::DURATION, 0.0)?;
        Ok((body, Some(duration_at)))
    }

    fn track_entry(track: &Track) -> Result<BytesMut> {
        let number = track.id.get() as u64;
        let mut entry = BytesMut::with_capacity(64);
        ebml::put_uint(&mut entry, ids::TRACK_NUMBER, number)?;
        ebml::put_uint(&mut entry, ids::TRACK_UID, number)?;
        ebml::put_uint(&mut entry, ids::FLAG_LACING, 0)?;
        ebml::put_string(&mut entry, ids::CODEC_ID, codec_id(track.codec()))?;
        if let Some(private) = track.config.codec_private() {
            ebml::put_binary(&mut entry, ids::CODEC_PRIVATE, private)?;
        }

        match &track.config {
            TrackConfig::Video(video) => {
                ebml::put_uint(&mut entry, ids::TRACK_TYPE, track_type::VIDEO)?;
                if let Some(rate) = video.frame_rate.filter(|r| *r > 0.0) {
                    let ns = (1e9 / rate).round() as u64;
                    ebml::put_uint(&mut entry, ids::DEFAULT_DURATION, ns)?;
                }
                let mut settings = BytesMut::new();
                ebml::put_uint(&mut settings, ids::PIXEL_WIDTH, video.width as u64)?;
                ebml::put_uint(&mut settings, ids::PIXEL_HEIGHT, video.height as u64)?;
                ebml::put_master(&mut entry, ids::VIDEO, &settings)?;
            }
            TrackConfig::Audio(audio) => {
                ebml::put_uint(&mut entry, ids::TRACK_TYPE, track_type::AUDIO)?;
                let mut settings = BytesMut::new();
                ebml::put_float(
                    &mut settings,
                    ids::SAMPLING_FREQUENCY,
                    audio.sample_rate as f64,
                )?;
                ebml::put_uint(&mut settings, ids::CHANNELS, audio.channels as u64)?;
                if let Some(bits) = audio.bits_per_sample {
                    ebml::put_uint(&mut settings, ids::BIT_DEPTH, bits as u64)?;
                }
                ebml::put_master(&mut entry, ids::AUDIO, &settings)?;
            }
            TrackConfig::Subtitle(subtitle) => {
                ebml::put_uint(&mut entry, ids::TRACK_TYPE, track_type::SUBTITLE)?;
                if let Some(language) = &subtitle.language {
                    ebml::put_string(&mut entry, ids::LANGUAGE, language)?;
                }
            }
        }
        Ok(entry)
    }

    async fn flush_cluster(&mut self, writer: &mut Writer) -> Result<()> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };
        trace!(
            start_ms = cluster.start_ms,
            blocks = cluster.blocks,
            bytes = cluster.body.len(),
            "writing cluster"
        );
        writer.write_ebml_id(ids::CLUSTER).await?;
        writer.write_ebml_vint(cluster.body.len() as u64, 0).await?;
        writer.write_owned(cluster.body.freeze()).await?;
        self.clusters_written += 1;
        Ok(())
    }

    async fn write_block(
        &mut self,
        writer: &mut Writer,
        track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        let ts_ms = (packet.timestamp * 1000.0).round() as i64;
        let threshold = self.options.cluster_threshold_ms as i64;

        if let Some(cluster) = &self.cluster {
            let span = ts_ms - cluster.start_ms;
            if span > threshold || span > i16::MAX as i64 || span < i16::MIN as i64 {
                self.flush_cluster(writer).await?;
            }
        }

        let mut cluster = match self.cluster.take() {
            Some(cluster) => cluster,
            None => {
                // Clusters are written on close, so this one lands at the
                // current end of output.
                self.cues.push(CuePoint {
                    time_ms: ts_ms.max(0) as u64,
                    track: track.id.get() as u64,
                    cluster_position: writer.position() - self.segment_data_start,
                });
                OpenCluster::new(ts_ms.max(0))?
            }
        };

        let relative = (ts_ms - cluster.start_ms) as i16;
        let mut block = BytesMut::with_capacity(packet.data.len() + 4);
        vint::put(&mut block, track.id.get() as u64, 0)?;
        block.put_i16(relative);
        block.put_u8(if packet.is_keyframe { 0x80 } else { 0x00 });
        block.put_slice(&packet.data);
        ebml::put_binary(&mut cluster.body, ids::SIMPLE_BLOCK, &block)?;
        cluster.blocks += 1;
        self.cluster = Some(cluster);

        let end = packet.end_timestamp().unwrap_or(packet.timestamp) * 1000.0;
        self.end_ms = self.end_ms.max(end);
        Ok(())
    }

    fn cues(&self) -> Result<BytesMut> {
        let mut body = BytesMut::new();
        for cue in &self.cues {
            let mut positions = BytesMut::new();
            ebml::put_uint(&mut positions, ids::CUE_TRACK, cue.track)?;
            ebml::put_uint(&mut positions, ids::CUE_CLUSTER_POSITION, cue.cluster_position)?;
            let mut point = BytesMut::new();
            ebml::put_uint(&mut point, ids::CUE_TIME, cue.time_ms)?;
            ebml::put_master(&mut point, ids::CUE_TRACK_POSITIONS, &positions)?;
            ebml::put_master(&mut body, ids::CUE_POINT, &point)?;
        }
        Ok(body)
    }
}

#[async_trait]
impl FormatMuxer for WebmMuxer {
    fn name(&self) -> &'static str {
        "WebM"
    }

    fn check_track(&self, _existing: &[Track], config: &TrackConfig) -> Result<()> {
        if is_webm_codec(config.codec()) {
            Ok(())
        } else {
            Err(Error::unsupported(format!("{} track in WebM", config.codec())))
        }
    }

    async fn write_header(&mut self, writer: &mut Writer, tracks: &[Track]) -> Result<()> {
        writer.write_bytes(&ebml::header("webm")?).await?;

        writer.write_ebml_id(ids::SEGMENT).await?;
        self.segment_size_offset = writer.position();
        writer.write_ebml_unknown_size(SEGMENT_SIZE_LEN).await?;
        self.segment_data_start = writer.position();

        let (info, duration_at) = self.info(writer.is_seekable())?;
        writer.write_ebml_id(ids::INFO).await?;
        writer.write_ebml_vint(info.len() as u64, 0).await?;
        self.duration_offset = duration_at.map(|at| writer.position() + at as u64);
        writer.write_bytes(&info).await?;

        let mut entries = BytesMut::new();
        for track in tracks {
            ebml::put_master(&mut entries, ids::TRACK_ENTRY, &Self::track_entry(track)?)?;
        }
        writer.write_ebml_id(ids::TRACKS).await?;
        writer.write_ebml_vint(entries.len() as u64, 0).await?;
        writer.write_bytes(&entries).await?;
        Ok(())
    }

    async fn write_video_packet(
        &mut self,
        writer: &mut Writer,
        track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        self.write_block(writer, track, packet).await
    }

    async fn write_audio_packet(
        &mut self,
        writer: &mut Writer,
        track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        self.write_block(writer, track, packet).await
    }

    async fn write_subtitle_packet(
        &mut self,
        writer: &mut Writer,
        track: &Track,
        packet: &EncodedPacket,
    ) -> Result<()> {
        self.write_block(writer, track, packet).await
    }

    async fn write_trailer(&mut self, writer: &mut Writer, _tracks: &[Track]) -> Result<()> {
        self.flush_cluster(writer).await?;

        if !self.cues.is_empty() {
            let cues = self.cues()?;
            writer.write_ebml_id(ids::CUES).await?;
            writer.write_ebml_vint(cues.len() as u64, 0).await?;
            writer.write_owned(cues.freeze()).await?;
        }

        if writer.is_seekable() {
            let end = writer.position();
            writer.seek(self.segment_size_offset).await?;
            writer
                .write_ebml_vint(end - self.segment_data_start, SEGMENT_SIZE_LEN)
                .await?;
            if let Some(offset) = self.duration_offset {
                writer.seek(offset).await?;
                writer.write_f64_be(self.end_ms).await?;
            }
            writer.seek(end).await?;
        }

        debug!(
            clusters = self.clusters_written,
            cues = self.cues.len(),
            duration_ms = self.end_ms,
            "WebM trailer written"
        );
        Ok(())
    }
}
