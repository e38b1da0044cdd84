//! EBML element codec shared by the Matroska demuxer and the WebM muxer.
//!
//! An element is `ID | size | payload`. IDs are 1 to 4 octets and keep their
//! length-marker bit; sizes are variable-length integers of 1 to 8 octets
//! where the all-ones pattern means "unknown size".
//!
//! Reading goes through a [`Reader`]; writing builds elements into a
//! [`BytesMut`] so a whole master element can be assembled before its size is
//! known.

use bytes::{BufMut, BytesMut};
use muxforge_io::vint;
use muxforge_io::{Reader, TextEncoding};

use crate::{Error, Result};

/// Longest element ID accepted.
pub const MAX_ID_LEN: usize = 4;

/// Matroska element IDs used by this crate.
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;
    pub const VOID: u32 = 0xEC;
    pub const CRC32: u32 = 0xBF;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMESTAMP_SCALE: u32 = 0x2AD7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const DEFAULT_DURATION: u32 = 0x23E383;
    pub const LANGUAGE: u32 = 0x22B59C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMESTAMP: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const BLOCK_DURATION: u32 = 0x9B;
    pub const REFERENCE_BLOCK: u32 = 0xFB;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;

    pub const CHAPTERS: u32 = 0x1043_A770;
    pub const TAGS: u32 = 0x1254_C367;
    pub const ATTACHMENTS: u32 = 0x1941_A469;
}

/// Matroska `TrackType` values.
pub mod track_type {
    pub const VIDEO: u64 = 1;
    pub const AUDIO: u64 = 2;
    pub const SUBTITLE: u64 = 0x11;
}

/// Whether an element contains child elements rather than an opaque payload.
pub fn is_master(id: u32) -> bool {
    matches!(
        id,
        ids::EBML
            | ids::SEGMENT
            | ids::SEEK_HEAD
            | ids::SEEK
            | ids::INFO
            | ids::TRACKS
            | ids::TRACK_ENTRY
            | ids::VIDEO
            | ids::AUDIO
            | ids::CLUSTER
            | ids::BLOCK_GROUP
            | ids::CUES
            | ids::CUE_POINT
            | ids::CUE_TRACK_POSITIONS
            | ids::CHAPTERS
            | ids::TAGS
            | ids::ATTACHMENTS
    )
}

/// Number of octets the ID occupies, derived from its value.
pub fn id_len(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Header of one element as found in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Element ID including the marker bit.
    pub id: u32,
    /// Payload size, `None` for the unknown-size sentinel.
    pub size: Option<u64>,
    /// Offset of the first ID octet.
    pub offset: u64,
    /// Combined length of the ID and size fields.
    pub header_len: u64,
}

impl ElementHeader {
    /// Offset of the first payload byte.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    /// Offset one past the payload, if the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.data_offset() + size)
    }

    pub fn is_master(&self) -> bool {
        is_master(self.id)
    }
}

/// Read an element ID at the cursor.
pub async fn read_id(reader: &mut Reader) -> Result<u32> {
    let offset = reader.position();
    let first = reader.read_u8().await?;
    let len = match first.leading_zeros() as usize {
        n if n < MAX_ID_LEN => n + 1,
        _ => {
            return Err(Error::format(
                "EBML",
                format!("invalid element ID octet {first:#04x} at offset {offset}"),
            ))
        }
    };
    let mut id = first as u32;
    for _ in 1..len {
        id = (id << 8) | reader.read_u8().await? as u32;
    }
    Ok(id)
}

/// Read an element ID and size at the cursor, leaving it at the payload.
pub async fn read_element_header(reader: &mut Reader) -> Result<ElementHeader> {
    let offset = reader.position();
    let id = read_id(reader).await?;
    let size = reader.read_vint().await?;
    Ok(ElementHeader {
        id,
        size: size.known(),
        offset,
        header_len: reader.position() - offset,
    })
}

/// Read an unsigned integer payload of `size` octets.
pub async fn read_uint(reader: &mut Reader, size: u64) -> Result<u64> {
    if size > 8 {
        return Err(Error::format(
            "EBML",
            format!("unsigned integer of {size} octets"),
        ));
    }
    reader.read_uint_be(size as usize).await
}

/// Read a float payload (0, 4 or 8 octets).
pub async fn read_float(reader: &mut Reader, size: u64) -> Result<f64> {
    match size {
        0 => Ok(0.0),
        4 => Ok(reader.read_f32_be().await? as f64),
        8 => reader.read_f64_be().await,
        _ => Err(Error::format("EBML", format!("float of {size} octets"))),
    }
}

/// Read a string payload, dropping trailing zero padding.
pub async fn read_string(reader: &mut Reader, size: u64) -> Result<String> {
    let s = reader.read_string(size as usize, TextEncoding::Utf8).await?;
    Ok(s.trim_end_matches('\0').to_string())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Append an element ID.
pub fn put_id(buf: &mut BytesMut, id: u32) {
    let len = id_len(id);
    buf.put_slice(&id.to_be_bytes()[4 - len..]);
}

/// Append an element size using at least `min_len` octets.
pub fn put_size(buf: &mut BytesMut, size: u64, min_len: usize) -> Result<()> {
    vint::put(buf, size, min_len)?;
    Ok(())
}

/// Append an element with an opaque payload.
pub fn put_binary(buf: &mut BytesMut, id: u32, data: &[u8]) -> Result<()> {
    put_id(buf, id);
    put_size(buf, data.len() as u64, 0)?;
    buf.put_slice(data);
    Ok(())
}

/// Append an unsigned integer element in its shortest big-endian form.
pub fn put_uint(buf: &mut BytesMut, id: u32, value: u64) -> Result<()> {
    let len = (8 - value.leading_zeros() as usize / 8).max(1);
    put_binary(buf, id, &value.to_be_bytes()[8 - len..])
}

/// Append an 8-octet float element.
pub fn put_float(buf: &mut BytesMut, id: u32, value: f64) -> Result<()> {
    put_binary(buf, id, &value.to_be_bytes())
}

/// Append a UTF-8 string element.
pub fn put_string(buf: &mut BytesMut, id: u32, value: &str) -> Result<()> {
    put_binary(buf, id, value.as_bytes())
}

/// Append a master element whose body was built separately.
pub fn put_master(buf: &mut BytesMut, id: u32, body: &[u8]) -> Result<()> {
    put_binary(buf, id, body)
}

/// Serialize a complete EBML header for `doc_type`.
pub fn header(doc_type: &str) -> Result<BytesMut> {
    let mut body = BytesMut::with_capacity(32);
    put_uint(&mut body, ids::EBML_VERSION, 1)?;
    put_uint(&mut body, ids::EBML_READ_VERSION, 1)?;
    put_uint(&mut body, ids::EBML_MAX_ID_LENGTH, 4)?;
    put_uint(&mut body, ids::EBML_MAX_SIZE_LENGTH, 8)?;
    put_string(&mut body, ids::DOC_TYPE, doc_type)?;
    put_uint(&mut body, ids::DOC_TYPE_VERSION, 4)?;
    put_uint(&mut body, ids::DOC_TYPE_READ_VERSION, 2)?;

    let mut buf = BytesMut::with_capacity(body.len() + 8);
    put_master(&mut buf, ids::EBML, &body)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxforge_io::BufferSource;
    use std::sync::Arc;

    fn reader(data: &[u8]) -> Reader {
        Reader::new(Arc::new(BufferSource::new(data.to_vec())))
    }

    #[test]
    fn test_master_set() {
        assert!(is_master(ids::SEGMENT));
        assert!(is_master(ids::TRACK_ENTRY));
        assert!(is_master(ids::CLUSTER));
        assert!(!is_master(ids::SIMPLE_BLOCK));
        assert!(!is_master(ids::CODEC_PRIVATE));
    }

    #[test]
    fn test_put_uint_is_minimal() {
        let mut buf = BytesMut::new();
        put_uint(&mut buf, ids::TRACK_NUMBER, 1).unwrap();
        assert_eq!(&buf[..], &[0xD7, 0x81, 0x01]);

        let mut buf = BytesMut::new();
        put_uint(&mut buf, ids::TIMESTAMP_SCALE, 1_000_000).unwrap();
        assert_eq!(&buf[..], &[0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]);

        let mut buf = BytesMut::new();
        put_uint(&mut buf, ids::TIMESTAMP, 0).unwrap();
        assert_eq!(&buf[..], &[0xE7, 0x81, 0x00]);
    }

    #[tokio::test]
    async fn test_header_round_trip() {
        let bytes = header("webm").unwrap();
        let mut r = reader(&bytes);

        let ebml = read_element_header(&mut r).await.unwrap();
        assert_eq!(ebml.id, ids::EBML);
        assert_eq!(ebml.end(), Some(bytes.len() as u64));

        let mut doc_type = None;
        while r.position() < bytes.len() as u64 {
            let child = read_element_header(&mut r).await.unwrap();
            let size = child.size.unwrap();
            if child.id == ids::DOC_TYPE {
                doc_type = Some(read_string(&mut r, size).await.unwrap());
            } else {
                r.skip(size);
            }
        }
        assert_eq!(doc_type.as_deref(), Some("webm"));
    }

    #[tokio::test]
    async fn test_unknown_size_header() {
        let mut buf = BytesMut::new();
        put_id(&mut buf, ids::SEGMENT);
        vint::put_unknown(&mut buf, 8).unwrap();

        let mut r = reader(&buf);
        let header = read_element_header(&mut r).await.unwrap();
        assert_eq!(header.id, ids::SEGMENT);
        assert_eq!(header.size, None);
        assert_eq!(header.header_len, 12);
        assert_eq!(header.end(), None);
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let mut r = reader(&[0x08, 0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(
            read_id(&mut r).await.unwrap_err(),
            Error::Format { .. }
        ));
    }

    #[tokio::test]
    async fn test_float_widths() {
        let mut data = Vec::new();
        data.extend_from_slice(&48_000f32.to_be_bytes());
        data.extend_from_slice(&2.5f64.to_be_bytes());
        let mut r = reader(&data);
        assert_eq!(read_float(&mut r, 4).await.unwrap(), 48_000.0);
        assert_eq!(read_float(&mut r, 8).await.unwrap(), 2.5);
        assert_eq!(read_float(&mut r, 0).await.unwrap(), 0.0);
    }
}
