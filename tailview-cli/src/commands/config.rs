//! Writes a default configuration file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use tailview_core::TailConfig;

/// Format of a generated configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    /// `config.yaml`
    Yaml,
    /// `config.json`
    Json,
    /// `config.toml`
    Toml,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Yaml => "config.yaml",
            Self::Json => "config.json",
            Self::Toml => "config.toml",
        }
    }
}

/// Serializes the default configuration in `format`.
fn render(config: &TailConfig, format: ConfigFormat) -> Result<String> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yml::to_string(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
    };
    Ok(rendered)
}

/// Generates a configuration file with default values.
///
/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(format: ConfigFormat, output_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let path = dir.join(format.file_name());
    let serialized = render(&TailConfig::with_defaults(), format)?;
    fs::write(&path, serialized).with_context(|| format!("failed to write {}", path.display()))?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(path)
}
