//! Integration tests for configuration loading, validation and persistence.

use muxforge::config::{self, Config};
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = write_config("");
    let config = config::load_config(file.path()).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.writer.staging_buffer_size, 64 * 1024);
    assert_eq!(config.webm.cluster_threshold_ms, 5000);
    assert_eq!(config.wav.frames_per_packet, 1024);
}

#[test]
fn test_sections_override_defaults() {
    let file = write_config(
        r#"
[reader]
prefetch_bytes = 4096

[writer]
staging_buffer_size = 1024

[webm]
cluster_threshold_ms = 2000
muxing_app = "test-app"

[wav]
frames_per_packet = 256
"#,
    );
    let config = config::load_config(file.path()).unwrap();
    assert_eq!(config.reader.prefetch_bytes, 4096);
    assert_eq!(config.writer.staging_buffer_size, 1024);
    assert_eq!(config.webm.cluster_threshold_ms, 2000);
    assert_eq!(config.webm.muxing_app, "test-app");
    assert_eq!(config.wav.frames_per_packet, 256);

    let muxer = config.muxer_options();
    assert_eq!(muxer.writer.staging_buffer_size, 1024);
    assert_eq!(muxer.webm.cluster_threshold_ms, 2000);
    let demuxer = config.demuxer_options();
    assert_eq!(demuxer.reader.prefetch_bytes, 4096);
    assert_eq!(demuxer.wav.frames_per_packet, 256);
}

#[test]
fn test_partial_section_keeps_other_fields() {
    let file = write_config("[webm]\ncluster_threshold_ms = 1000\n");
    let config = config::load_config(file.path()).unwrap();
    assert_eq!(config.webm.cluster_threshold_ms, 1000);
    assert!(config.webm.muxing_app.starts_with("muxforge-"));
}

#[test]
fn test_zero_cluster_threshold_rejected() {
    let file = write_config("[webm]\ncluster_threshold_ms = 0\n");
    let err = config::load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("cluster_threshold_ms"));
}

#[test]
fn test_zero_staging_buffer_rejected() {
    let mut config = Config::default();
    config.writer.staging_buffer_size = 0;
    assert!(config::validate_config(&config).is_err());
}

#[test]
fn test_suspicious_values_warn() {
    let mut config = Config::default();
    assert!(config::validate_config(&config).unwrap().is_empty());

    config.reader.prefetch_bytes = 0;
    config.webm.cluster_threshold_ms = 60_000;
    let warnings = config::validate_config(&config).unwrap();
    assert_eq!(warnings.len(), 2);
}

#[test]
fn test_malformed_toml_reports_path() {
    let file = write_config("[writer\nstaging_buffer_size = ");
    let err = config::load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(config::load_config(&path).is_err());
    assert!(config::load_config_or_default(Some(&path)).is_err());
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("muxforge.toml");

    let mut config = Config::default();
    config.webm.cluster_threshold_ms = 2500;
    config.wav.frames_per_packet = 512;
    config::persist::save_config(&path, &config).unwrap();

    assert_eq!(config::load_config(&path).unwrap(), config);
}

#[test]
fn test_invalid_config_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("muxforge.toml");

    let mut config = Config::default();
    config.wav.frames_per_packet = 0;
    assert!(config::persist::save_config(&path, &config).is_err());
    assert!(!path.exists());
}
