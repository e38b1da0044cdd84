//! Configuration persistence.

use anyhow::{Context, Result};
use std::path::Path;

/// Write the entire config to a TOML file, replacing its contents.
pub fn save_config(path: &Path, config: &super::Config) -> Result<()> {
    super::validate_config(config)?;

    let content = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}
