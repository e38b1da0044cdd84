pub mod persist;
mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Relative timestamps inside a WebM cluster are 16-bit milliseconds.
const MAX_CLUSTER_SPAN_MS: u64 = i16::MAX as u64;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in validate_config(&config)? {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./muxforge.toml", "/etc/muxforge/config.toml"];

    for path_str in default_paths {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    tracing::debug!("no config file found, using defaults");
    Ok(Config::default())
}

/// Validate configuration.
///
/// Settings that cannot work are errors. Settings that work but are likely
/// mistakes come back as warnings.
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if config.writer.staging_buffer_size == 0 {
        anyhow::bail!("writer.staging_buffer_size cannot be 0");
    }
    if config.webm.cluster_threshold_ms == 0 {
        anyhow::bail!("webm.cluster_threshold_ms cannot be 0");
    }
    if config.wav.frames_per_packet == 0 {
        anyhow::bail!("wav.frames_per_packet cannot be 0");
    }

    if config.reader.prefetch_bytes == 0 {
        warnings.push(
            "reader.prefetch_bytes is 0: every cache miss fetches only the bytes requested"
                .to_string(),
        );
    }
    if config.webm.cluster_threshold_ms > MAX_CLUSTER_SPAN_MS {
        warnings.push(format!(
            "webm.cluster_threshold_ms {} exceeds the {} ms a cluster can address",
            config.webm.cluster_threshold_ms, MAX_CLUSTER_SPAN_MS
        ));
    }
    if config.webm.muxing_app.is_empty() {
        warnings.push("webm.muxing_app is empty".to_string());
    }

    Ok(warnings)
}
