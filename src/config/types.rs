use serde::{Deserialize, Serialize};

use muxforge_io::{ReaderOptions, WriterOptions};
use muxforge_media::{DemuxerOptions, MuxerOptions, WavOptions, WebmOptions};

/// Top-level configuration, one section per tunable component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderOptions,

    #[serde(default)]
    pub writer: WriterOptions,

    #[serde(default)]
    pub webm: WebmOptions,

    #[serde(default)]
    pub wav: WavOptions,
}

impl Config {
    /// Options for demuxers created from this configuration.
    pub fn demuxer_options(&self) -> DemuxerOptions {
        DemuxerOptions {
            reader: self.reader.clone(),
            wav: self.wav.clone(),
        }
    }

    /// Options for muxers created from this configuration.
    pub fn muxer_options(&self) -> MuxerOptions {
        MuxerOptions {
            writer: self.writer.clone(),
            webm: self.webm.clone(),
        }
    }
}
