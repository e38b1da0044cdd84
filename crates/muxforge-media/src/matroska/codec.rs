//! Matroska codec ID strings.

use muxforge_common::{Codec, PcmFormat};

/// Map a `CodecID` string to a [`Codec`].
///
/// PCM ids need the track's bit depth to pick a sample layout; an unusual
/// depth falls back to [`Codec::Other`].
pub fn codec_from_id(id: &str, bit_depth: Option<u16>) -> Codec {
    match id {
        "V_MPEG4/ISO/AVC" => Codec::Avc,
        "V_MPEGH/ISO/HEVC" => Codec::Hevc,
        "V_VP8" => Codec::Vp8,
        "V_VP9" => Codec::Vp9,
        "V_AV1" => Codec::Av1,
        "A_MPEG/L1" => Codec::Mp1,
        "A_MPEG/L2" => Codec::Mp2,
        "A_MPEG/L3" => Codec::Mp3,
        "A_FLAC" => Codec::Flac,
        "A_OPUS" => Codec::Opus,
        "A_VORBIS" => Codec::Vorbis,
        "S_TEXT/WEBVTT" | "D_WEBVTT/SUBTITLES" => Codec::WebVtt,
        "S_TEXT/UTF8" => Codec::Text,
        "A_PCM/INT/LIT" | "A_PCM/FLOAT/IEEE" => {
            let float = id == "A_PCM/FLOAT/IEEE";
            bit_depth
                .and_then(|bits| PcmFormat::from_bits(bits, float))
                .map_or_else(|| Codec::Other(id.to_string()), Codec::Pcm)
        }
        _ if id.starts_with("A_AAC") => Codec::Aac,
        _ => Codec::Other(id.to_string()),
    }
}

/// The `CodecID` string for `codec`.
pub fn codec_id(codec: &Codec) -> &str {
    match codec {
        Codec::Avc => "V_MPEG4/ISO/AVC",
        Codec::Hevc => "V_MPEGH/ISO/HEVC",
        Codec::Vp8 => "V_VP8",
        Codec::Vp9 => "V_VP9",
        Codec::Av1 => "V_AV1",
        Codec::Aac => "A_AAC",
        Codec::Mp1 => "A_MPEG/L1",
        Codec::Mp2 => "A_MPEG/L2",
        Codec::Mp3 => "A_MPEG/L3",
        Codec::Flac => "A_FLAC",
        Codec::Opus => "A_OPUS",
        Codec::Vorbis => "A_VORBIS",
        Codec::Pcm(format) if format.is_float() => "A_PCM/FLOAT/IEEE",
        Codec::Pcm(_) => "A_PCM/INT/LIT",
        Codec::WebVtt => "S_TEXT/WEBVTT",
        Codec::Text => "S_TEXT/UTF8",
        Codec::Other(id) => id,
    }
}

/// Whether a WebM file may carry `codec`.
pub fn is_webm_codec(codec: &Codec) -> bool {
    matches!(
        codec,
        Codec::Vp8 | Codec::Vp9 | Codec::Av1 | Codec::Opus | Codec::Vorbis | Codec::WebVtt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids() {
        assert_eq!(codec_from_id("V_VP9", None), Codec::Vp9);
        assert_eq!(codec_from_id("A_AAC/MPEG4/LC", None), Codec::Aac);
        assert_eq!(
            codec_from_id("A_PCM/INT/LIT", Some(24)),
            Codec::Pcm(PcmFormat::S24Le)
        );
        assert_eq!(
            codec_from_id("A_PCM/FLOAT/IEEE", Some(64)),
            Codec::Pcm(PcmFormat::F64Le)
        );
        assert_eq!(
            codec_from_id("A_PCM/INT/LIT", None),
            Codec::Other("A_PCM/INT/LIT".into())
        );
        assert_eq!(codec_from_id("V_THEORA", None), Codec::Other("V_THEORA".into()));
    }

    #[test]
    fn test_ids_map_back() {
        for codec in [Codec::Vp8, Codec::Opus, Codec::Flac, Codec::WebVtt, Codec::Mp3] {
            assert_eq!(codec_from_id(codec_id(&codec), None), codec);
        }
        assert_eq!(codec_id(&Codec::Pcm(PcmFormat::F32Le)), "A_PCM/FLOAT/IEEE");
    }

    #[test]
    fn test_webm_codecs() {
        assert!(is_webm_codec(&Codec::Vp9));
        assert!(!is_webm_codec(&Codec::Avc));
        assert!(!is_webm_codec(&Codec::Aac));
    }
}
