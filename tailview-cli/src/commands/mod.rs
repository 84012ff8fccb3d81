//! Subcommand implementations and the helpers they share.

/// `completion` subcommand
pub mod completion;
/// `config` subcommand
pub mod config;
/// Interactive control lines
pub mod control;
/// `dates` subcommand
pub mod dates;
/// `tail` subcommand
pub mod tail;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::BaseDirs;
use reqwest::Client;
use tailview_core::{TailConfig, config::ConfigOverrides};

/// Default configuration file, used only when it exists.
fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("tailview").join("config.yaml"))
        .filter(|path| path.is_file())
}

/// Loads the configuration from `path`, or the default file when present.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<TailConfig> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    TailConfig::load_config(path.as_deref(), overrides).context("failed to load configuration")
}

/// HTTP client for streams and listings. No overall timeout: streams are long-lived.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("tailview/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")
}
