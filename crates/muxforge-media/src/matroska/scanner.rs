use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use muxforge_common::{AudioConfig, SubtitleConfig, Track, TrackConfig, TrackId, VideoConfig};
use muxforge_io::Reader;

use super::{codec_from_id, lace_sizes, Lacing};
use crate::demuxer::{FormatScanner, ScanResult};
use crate::ebml::{self, ids, track_type, ElementHeader};
use crate::frame_table::{FrameEntry, FrameTable, FrameTableBuilder};
use crate::{Error, Result};

/// Nanoseconds per timestamp tick unless `Info` says otherwise.
const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;

/// Scanner for Matroska and WebM files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatroskaScanner;

fn format_error(message: impl Into<String>) -> Error {
    Error::format("Matroska", message)
}

/// Top-level Segment children; one of these ends a Cluster of unknown size.
fn is_segment_child(id: u32) -> bool {
    matches!(
        id,
        ids::SEEK_HEAD
            | ids::INFO
            | ids::TRACKS
            | ids::CLUSTER
            | ids::CUES
            | ids::CHAPTERS
            | ids::TAGS
            | ids::ATTACHMENTS
    )
}

#[derive(Debug, Clone)]
struct TrackInfo {
    id: TrackId,
    /// Default frame duration in seconds.
    default_duration: Option<f64>,
}

/// Scan state shared by the Segment walk.
struct SegmentScan {
    timestamp_scale: u64,
    /// `Info` duration in timestamp ticks.
    duration_ticks: Option<f64>,
    tracks: Vec<Track>,
    by_number: HashMap<u64, TrackInfo>,
    builder: FrameTableBuilder,
    /// Last offset that may be read.
    end: u64,
}

impl SegmentScan {
    fn seconds(&self, ticks: f64) -> f64 {
        ticks * self.timestamp_scale as f64 / 1e9
    }
}

/// A block payload as found in a SimpleBlock or BlockGroup.
struct BlockRef {
    data_offset: u64,
    size: u64,
    /// SimpleBlocks carry their keyframe flag; a Block is a keyframe unless
    /// its group references another block.
    simple: bool,
}

/// Read a child element header, bounded by `end`.
///
/// Returns `None` when the parent is exhausted or the header is cut off.
async fn next_child(reader: &mut Reader, end: u64) -> Result<Option<ElementHeader>> {
    if reader.position() >= end || !reader.has_bytes(2).await? {
        return Ok(None);
    }
    match ebml::read_element_header(reader).await {
        Ok(header) => Ok(Some(header)),
        Err(e) if e.is_eof() => Ok(None),
        Err(e) => Err(e),
    }
}

fn known_size(header: &ElementHeader) -> Result<u64> {
    header.size.ok_or_else(|| {
        format_error(format!(
            "element {:#x} at offset {} has unknown size",
            header.id, header.offset
        ))
    })
}

async fn read_doc_type(reader: &mut Reader) -> Result<String> {
    reader.seek(0);
    let header = ebml::read_element_header(reader).await?;
    if header.id != ids::EBML {
        return Err(format_error("missing EBML header"));
    }
    let end = header.data_offset() + known_size(&header)?;

    let mut doc_type = String::from("matroska");
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        if child.id == ids::DOC_TYPE {
            doc_type = ebml::read_string(reader, size).await?;
        }
        reader.seek(child.data_offset() + size);
    }
    reader.seek(end);
    Ok(doc_type)
}

async fn read_info(
    reader: &mut Reader,
    header: &ElementHeader,
    scan: &mut SegmentScan,
) -> Result<()> {
    let end = header.data_offset() + known_size(header)?;
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        match child.id {
            ids::TIMESTAMP_SCALE => {
                scan.timestamp_scale = match ebml::read_uint(reader, size).await? {
                    0 => DEFAULT_TIMESTAMP_SCALE,
                    n => n,
                }
            }
            ids::DURATION => scan.duration_ticks = Some(ebml::read_float(reader, size).await?),
            _ => {}
        }
        reader.seek(child.data_offset() + size);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct TrackEntry {
    number: u64,
    kind: u64,
    codec_id: String,
    codec_private: Option<Vec<u8>>,
    default_duration_ns: Option<u64>,
    language: Option<String>,
    width: u32,
    height: u32,
    sample_rate: f64,
    channels: u16,
    bit_depth: Option<u16>,
}

async fn read_video(reader: &mut Reader, end: u64, entry: &mut TrackEntry) -> Result<()> {
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        match child.id {
            ids::PIXEL_WIDTH => entry.width = ebml::read_uint(reader, size).await? as u32,
            ids::PIXEL_HEIGHT => entry.height = ebml::read_uint(reader, size).await? as u32,
            _ => {}
        }
        reader.seek(child.data_offset() + size);
    }
    Ok(())
}

async fn read_audio(reader: &mut Reader, end: u64, entry: &mut TrackEntry) -> Result<()> {
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        match child.id {
            ids::SAMPLING_FREQUENCY => entry.sample_rate = ebml::read_float(reader, size).await?,
            ids::CHANNELS => entry.channels = ebml::read_uint(reader, size).await? as u16,
            ids::BIT_DEPTH => entry.bit_depth = Some(ebml::read_uint(reader, size).await? as u16),
            _ => {}
        }
        reader.seek(child.data_offset() + size);
    }
    Ok(())
}

async fn read_track_entry(reader: &mut Reader, end: u64) -> Result<TrackEntry> {
    let mut entry = TrackEntry {
        sample_rate: 8000.0,
        channels: 1,
        ..Default::default()
    };
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        let child_end = child.data_offset() + size;
        match child.id {
            ids::TRACK_NUMBER => entry.number = ebml::read_uint(reader, size).await?,
            ids::TRACK_TYPE => entry.kind = ebml::read_uint(reader, size).await?,
            ids::CODEC_ID => entry.codec_id = ebml::read_string(reader, size).await?,
            ids::CODEC_PRIVATE => {
                entry.codec_private = Some(reader.read_bytes(size as usize).await?.to_vec())
            }
            ids::DEFAULT_DURATION => {
                entry.default_duration_ns = Some(ebml::read_uint(reader, size).await?)
            }
            ids::LANGUAGE => entry.language = Some(ebml::read_string(reader, size).await?),
            ids::VIDEO => read_video(reader, child_end, &mut entry).await?,
            ids::AUDIO => read_audio(reader, child_end, &mut entry).await?,
            _ => {}
        }
        reader.seek(child_end);
    }
    Ok(entry)
}

fn track_config(entry: TrackEntry) -> Option<TrackConfig> {
    let codec = codec_from_id(&entry.codec_id, entry.bit_depth);
    match entry.kind {
        track_type::VIDEO => {
            let mut config = VideoConfig::new(codec, entry.width, entry.height);
            config.frame_rate = entry
                .default_duration_ns
                .filter(|&ns| ns > 0)
                .map(|ns| 1e9 / ns as f64);
            config.codec_private = entry.codec_private;
            Some(TrackConfig::Video(config))
        }
        track_type::AUDIO => {
            let mut config =
                AudioConfig::new(codec, entry.sample_rate.round() as u32, entry.channels);
            config.bits_per_sample = entry.bit_depth;
            config.codec_private = entry.codec_private;
            Some(TrackConfig::Audio(config))
        }
        track_type::SUBTITLE => {
            let mut config = SubtitleConfig::new(codec);
            config.language = entry.language;
            config.codec_private = entry.codec_private;
            Some(TrackConfig::Subtitle(config))
        }
        _ => None,
    }
}

async fn read_tracks(
    reader: &mut Reader,
    header: &ElementHeader,
    scan: &mut SegmentScan,
) -> Result<()> {
    let end = header.data_offset() + known_size(header)?;
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        let child_end = child.data_offset() + size;
        if child.id == ids::TRACK_ENTRY {
            let entry = read_track_entry(reader, child_end).await?;
            let number = entry.number;
            let default_duration = entry.default_duration_ns.map(|ns| ns as f64 / 1e9);
            let kind = entry.kind;
            match track_config(entry) {
                Some(_) if scan.by_number.contains_key(&number) => {
                    warn!(number, "duplicate Matroska track number, ignoring entry");
                }
                Some(config) => {
                    let id = TrackId::new(scan.tracks.len() as u32 + 1);
                    debug!(number, track = %id, codec = %config.codec(), "Matroska track");
                    scan.tracks.push(Track::new(id, config));
                    scan.by_number.insert(
                        number,
                        TrackInfo {
                            id,
                            default_duration,
                        },
                    );
                }
                None => debug!(number, kind, "skipping Matroska track of unsupported type"),
            }
        }
        reader.seek(child_end);
    }
    Ok(())
}

/// Locate the Block inside a BlockGroup and pick up its duration and
/// reference status.
async fn read_block_group(
    reader: &mut Reader,
    end: u64,
) -> Result<(Option<BlockRef>, Option<u64>, bool)> {
    let mut block = None;
    let mut duration = None;
    let mut referenced = false;
    while let Some(child) = next_child(reader, end).await? {
        let size = known_size(&child)?;
        match child.id {
            ids::BLOCK => {
                block = Some(BlockRef {
                    data_offset: child.data_offset(),
                    size,
                    simple: false,
                })
            }
            ids::BLOCK_DURATION => duration = Some(ebml::read_uint(reader, size).await?),
            ids::REFERENCE_BLOCK => referenced = true,
            _ => {}
        }
        reader.seek(child.data_offset() + size);
    }
    Ok((block, duration, referenced))
}

/// Add the frames of one block to the table.
async fn read_block(
    reader: &mut Reader,
    block: BlockRef,
    cluster_ticks: u64,
    block_duration: Option<u64>,
    referenced: bool,
    scan: &mut SegmentScan,
) -> Result<()> {
    reader.seek(block.data_offset);
    let number = reader.read_vint().await?.value;
    let relative = reader.read_i16_be().await?;
    let flags = reader.read_u8().await?;

    let Some(info) = scan.by_number.get(&number).cloned() else {
        trace!(number, "block for an unknown track");
        return Ok(());
    };
    let is_keyframe = if block.simple {
        flags & 0x80 != 0
    } else {
        !referenced
    };

    let body = reader.position();
    let body_len = (block.data_offset + block.size)
        .checked_sub(body)
        .ok_or_else(|| format_error(format!("block at offset {} too short", block.data_offset)))?;

    let lacing = Lacing::from_flags(flags);
    let (lace_header, sizes) = if lacing == Lacing::None {
        (0, vec![body_len as u32])
    } else {
        let data = reader.read_bytes(body_len as usize).await?;
        lace_sizes(lacing, &data)?
    };

    let ticks = (cluster_ticks as i64 + relative as i64).max(0) as f64;
    let start = scan.seconds(ticks);
    let frame_duration = match (block_duration, sizes.len()) {
        (Some(d), n) => Some(scan.seconds(d as f64) / n as f64),
        (None, _) => info.default_duration,
    };

    let mut offset = body + lace_header as u64;
    for (i, size) in sizes.into_iter().enumerate() {
        let timestamp = start + frame_duration.map_or(0.0, |d| d * i as f64);
        scan.builder.push(FrameEntry {
            track_id: info.id,
            offset,
            size,
            header_len: 0,
            timestamp,
            duration: frame_duration,
            is_keyframe,
        });
        offset += size as u64;
    }
    Ok(())
}

/// Walk one Cluster and return the offset where the Segment walk resumes.
async fn read_cluster(
    reader: &mut Reader,
    header: &ElementHeader,
    scan: &mut SegmentScan,
) -> Result<u64> {
    let end = header.end().map_or(scan.end, |e| e.min(scan.end));
    let mut cluster_ticks = 0u64;

    while let Some(child) = next_child(reader, end).await? {
        if header.size.is_none() && is_segment_child(child.id) {
            // An unknown-size cluster ends where the next top-level element begins.
            return Ok(child.offset);
        }
        let Some(size) = child.size else {
            warn!(offset = child.offset, "unknown-size element inside a cluster");
            return Ok(scan.end);
        };
        let child_end = child.data_offset() + size;
        if child_end > scan.end {
            warn!(offset = child.offset, "dropping truncated trailing block");
            return Ok(scan.end);
        }

        match child.id {
            ids::TIMESTAMP => cluster_ticks = ebml::read_uint(reader, size).await?,
            ids::SIMPLE_BLOCK => {
                let block = BlockRef {
                    data_offset: child.data_offset(),
                    size,
                    simple: true,
                };
                read_block(reader, block, cluster_ticks, None, false, scan).await?;
            }
            ids::BLOCK_GROUP => {
                let (block, duration, referenced) =
                    read_block_group(reader, child_end).await?;
                if let Some(block) = block {
                    read_block(reader, block, cluster_ticks, duration, referenced, scan).await?;
                }
            }
            _ => {}
        }
        reader.seek(child_end);
    }
    Ok(end)
}

#[async_trait]
impl FormatScanner for MatroskaScanner {
    async fn scan(&self, reader: &mut Reader) -> Result<ScanResult> {
        let doc_type = read_doc_type(reader).await?;
        if doc_type != "matroska" && doc_type != "webm" {
            return Err(format_error(format!("unsupported DocType {doc_type:?}")));
        }

        let segment = loop {
            let header = ebml::read_element_header(reader)
                .await
                .map_err(|e| if e.is_eof() { format_error("missing Segment") } else { e })?;
            if header.id == ids::SEGMENT {
                break header;
            }
            reader.seek(header.data_offset() + known_size(&header)?);
        };

        let stream_end = reader.resolve_size().await?;
        let end = segment.end().map_or(stream_end, |e| e.min(stream_end));
        let mut scan = SegmentScan {
            timestamp_scale: DEFAULT_TIMESTAMP_SCALE,
            duration_ticks: None,
            tracks: Vec::new(),
            by_number: HashMap::new(),
            builder: FrameTable::builder(),
            end,
        };

        reader.seek(segment.data_offset());
        while let Some(child) = next_child(reader, end).await? {
            match child.id {
                ids::CLUSTER => {
                    let resume = read_cluster(reader, &child, &mut scan).await?;
                    reader.seek(resume);
                    continue;
                }
                ids::INFO => read_info(reader, &child, &mut scan).await?,
                ids::TRACKS => read_tracks(reader, &child, &mut scan).await?,
                _ => trace!(id = child.id, "skipping top-level element"),
            }
            let Some(size) = child.size else {
                warn!(id = child.id, "unknown-size top-level element, stopping");
                break;
            };
            reader.seek(child.data_offset() + size);
        }

        let table = scan.builder.build();
        // A zero Duration is an unpatched placeholder.
        let duration = match scan.duration_ticks.filter(|ticks| *ticks > 0.0) {
            Some(ticks) => Some(scan.timestamp_scale as f64 * ticks / 1e9),
            None => table.end_time(),
        };
        debug!(
            doc_type = %doc_type,
            tracks = scan.tracks.len(),
            frames = table.len(),
            "Matroska scan complete"
        );

        Ok(ScanResult {
            tracks: scan.tracks,
            table,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demuxer::{Demuxer, InputFormat};
    use crate::ebml::{put_binary, put_float, put_id, put_master, put_string, put_uint};
    use bytes::BytesMut;
    use muxforge_common::Codec;
    use muxforge_io::{vint, BufferSource};
    use std::sync::Arc;

    fn block(track: u8, relative: i16, flags: u8, body: &[u8]) -> Vec<u8> {
        let mut b = vec![0x80 | track];
        b.extend_from_slice(&relative.to_be_bytes());
        b.push(flags);
        b.extend_from_slice(body);
        b
    }

    fn tracks() -> BytesMut {
        let mut audio = BytesMut::new();
        put_float(&mut audio, ids::SAMPLING_FREQUENCY, 48000.0).unwrap();
        put_uint(&mut audio, ids::CHANNELS, 2).unwrap();
        let mut opus = BytesMut::new();
        put_uint(&mut opus, ids::TRACK_NUMBER, 1).unwrap();
        put_uint(&mut opus, ids::TRACK_TYPE, track_type::AUDIO).unwrap();
        put_string(&mut opus, ids::CODEC_ID, "A_OPUS").unwrap();
        put_binary(&mut opus, ids::CODEC_PRIVATE, b"OpusHead").unwrap();
        put_master(&mut opus, ids::AUDIO, &audio).unwrap();

        let mut video = BytesMut::new();
        put_uint(&mut video, ids::PIXEL_WIDTH, 320).unwrap();
        put_uint(&mut video, ids::PIXEL_HEIGHT, 240).unwrap();
        let mut vp9 = BytesMut::new();
        put_uint(&mut vp9, ids::TRACK_NUMBER, 2).unwrap();
        put_uint(&mut vp9, ids::TRACK_TYPE, track_type::VIDEO).unwrap();
        put_string(&mut vp9, ids::CODEC_ID, "V_VP9").unwrap();
        put_uint(&mut vp9, ids::DEFAULT_DURATION, 40_000_000).unwrap();
        put_master(&mut vp9, ids::VIDEO, &video).unwrap();

        let mut body = BytesMut::new();
        put_master(&mut body, ids::TRACK_ENTRY, &opus).unwrap();
        put_master(&mut body, ids::TRACK_ENTRY, &vp9).unwrap();
        let mut out = BytesMut::new();
        put_master(&mut out, ids::TRACKS, &body).unwrap();
        out
    }

    /// A WebM file with an unknown-size Segment, an unknown-size Cluster
    /// holding a plain and a Xiph-laced SimpleBlock, then a sized Cluster
    /// with a BlockGroup.
    fn sample_file() -> Vec<u8> {
        let mut out = ebml::header("webm").unwrap();
        put_id(&mut out, ids::SEGMENT);
        vint::put_unknown(&mut out, 8).unwrap();

        let mut info = BytesMut::new();
        put_uint(&mut info, ids::TIMESTAMP_SCALE, 1_000_000).unwrap();
        put_float(&mut info, ids::DURATION, 500.0).unwrap();
        put_master(&mut out, ids::INFO, &info).unwrap();
        out.extend_from_slice(&tracks());

        put_id(&mut out, ids::CLUSTER);
        vint::put_unknown(&mut out, 8).unwrap();
        put_uint(&mut out, ids::TIMESTAMP, 0).unwrap();
        put_binary(&mut out, ids::SIMPLE_BLOCK, &block(2, 0, 0x80, &[0xAA; 10])).unwrap();
        let laced = [1, 3, 7, 7, 7, 8, 8, 8, 8];
        put_binary(&mut out, ids::SIMPLE_BLOCK, &block(1, 0, 0x82, &laced)).unwrap();

        let mut group = BytesMut::new();
        put_binary(&mut group, ids::BLOCK, &block(2, 40, 0x00, &[0xBB; 6])).unwrap();
        put_uint(&mut group, ids::BLOCK_DURATION, 40).unwrap();
        put_binary(&mut group, ids::REFERENCE_BLOCK, &[0xD8]).unwrap();
        let mut cluster = BytesMut::new();
        put_uint(&mut cluster, ids::TIMESTAMP, 100).unwrap();
        put_master(&mut cluster, ids::BLOCK_GROUP, &group).unwrap();
        put_master(&mut out, ids::CLUSTER, &cluster).unwrap();

        out.to_vec()
    }

    async fn scan(data: Vec<u8>) -> Result<ScanResult> {
        let mut reader = Reader::new(Arc::new(BufferSource::new(data)));
        MatroskaScanner.scan(&mut reader).await
    }

    #[tokio::test]
    async fn test_tracks_and_info() {
        let result = scan(sample_file()).await.unwrap();
        assert_eq!(result.duration, Some(0.5));
        assert_eq!(result.tracks.len(), 2);

        let audio = result.tracks[0].audio().unwrap();
        assert_eq!(result.tracks[0].id, TrackId::new(1));
        assert_eq!(audio.codec, Codec::Opus);
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.codec_private.as_deref(), Some(&b"OpusHead"[..]));

        let video = result.tracks[1].video().unwrap();
        assert_eq!(video.codec, Codec::Vp9);
        assert_eq!((video.width, video.height), (320, 240));
        assert_eq!(video.frame_rate, Some(25.0));
    }

    #[tokio::test]
    async fn test_blocks_and_lacing() {
        let result = scan(sample_file()).await.unwrap();
        let video: Vec<_> = result.table.track_entries(TrackId::new(2)).collect();
        assert_eq!(video.len(), 2);
        assert!(video[0].is_keyframe);
        assert_eq!(video[0].size, 10);
        assert!(!video[1].is_keyframe);
        assert!((video[1].timestamp - 0.14).abs() < 1e-9);
        assert_eq!(video[1].duration, Some(0.04));

        let audio: Vec<_> = result.table.track_entries(TrackId::new(1)).collect();
        assert_eq!(audio.iter().map(|e| e.size).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_demuxer_reads_laced_frames() {
        let source = Arc::new(BufferSource::new(sample_file()));
        let mut demuxer = Demuxer::with_format(source, InputFormat::Matroska);
        let first = demuxer.read_packet(TrackId::new(1)).await.unwrap().unwrap();
        let second = demuxer.read_packet(TrackId::new(1)).await.unwrap().unwrap();
        assert_eq!(&first.data[..], &[7, 7, 7]);
        assert_eq!(&second.data[..], &[8, 8, 8, 8]);
        assert!(demuxer.read_packet(TrackId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_block_dropped() {
        let mut data = sample_file();
        // Unknown-size Cluster ending in a SimpleBlock that claims 100 bytes
        // with 5 present.
        data.extend_from_slice(&[0x1F, 0x43, 0xB6, 0x75, 0x01, 0xFF, 0xFF, 0xFF]);
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        data.extend_from_slice(&[0xA3, 0xE4, 0x81, 0x00, 0x00, 0x80, 0x01]);
        let result = scan(data).await.unwrap();
        assert_eq!(result.table.len(), 4);
    }

    #[tokio::test]
    async fn test_foreign_doc_type_rejected() {
        let data = ebml::header("mkv3d").unwrap().to_vec();
        let err = scan(data).await.unwrap_err();
        assert!(matches!(err, Error::Format { format: "Matroska", .. }));
    }

    #[tokio::test]
    async fn test_missing_ebml_magic_rejected() {
        let err = scan(vec![0x42, 0x86, 0x81, 0x01]).await.unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }
}
