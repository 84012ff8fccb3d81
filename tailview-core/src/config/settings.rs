//! # Settings
//!
//! File, environment and command line configuration for the viewer.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::{
    buffer::{DEFAULT_MAX_MESSAGES, DisplayOptions},
    error::{TailError, TailResult},
    query::DebounceDelays,
    request::resolve_endpoint,
    transport::RetryPolicy,
    viewer::ViewerOptions,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Largest accepted debounce delay, in milliseconds.
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Log output format
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Debounce applied before reconnecting after a filter edit
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DebounceConfig {
    /// Connection kind, date and tag edits
    pub selector_ms: u64,

    /// Free-text search edits
    pub search_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            selector_ms: 100,
            search_ms: 500,
        }
    }
}

impl DebounceConfig {
    /// Delays used by the query builder.
    #[must_use]
    pub fn delays(&self) -> DebounceDelays {
        DebounceDelays {
            selector: Duration::from_millis(self.selector_ms),
            search: Duration::from_millis(self.search_ms),
        }
    }
}

/// Transport-native retry settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after a failure before giving up; 0 disables retrying
    pub max_attempts: u32,

    /// Base delay when the server sent no `retry:` hint
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Policy handed to the HTTP transport.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// The main configuration structure for tailview
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TailConfig {
    /// Base URL of the event server
    pub server_url: String,

    /// Stream endpoint, relative to `server_url` or absolute
    pub endpoint: String,

    /// Date listing endpoint, relative to `server_url` or absolute
    pub dates_path: String,

    /// Capacity of the message buffer
    pub max_messages: usize,

    /// Prefix lines with the arrival time
    pub show_timestamps: bool,

    /// Directory for exported message files
    pub export_dir: Option<PathBuf>,

    /// Bearer token forwarded on every request
    pub auth_token: Option<String>,

    /// Log level and format
    pub logging: LoggingConfig,

    /// Reconnect debounce after filter edits
    pub debounce: DebounceConfig,

    /// Transport-native retries
    pub retry: RetryConfig,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Values given on the command line; `None` leaves the resolved value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replaces `server_url`
    pub server_url: Option<String>,
    /// Replaces `endpoint`
    pub endpoint: Option<String>,
    /// Replaces `max_messages`
    pub max_messages: Option<usize>,
    /// Replaces `show_timestamps`
    pub show_timestamps: Option<bool>,
    /// Replaces `export_dir`
    pub export_dir: Option<PathBuf>,
    /// Replaces `logging.level`
    pub log_level: Option<String>,
}

impl TailConfig {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            endpoint: "/api/events".to_string(),
            dates_path: "/dates".to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
            show_timestamps: true,
            export_dir: None,
            auth_token: None,
            logging: LoggingConfig::default(),
            debounce: DebounceConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Environment variables only apply to values the file left at their
    /// defaults; `overrides` win over both.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the result fails validation.
    pub fn load_config(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> TailResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::with_defaults(),
        };

        config.apply_env()?;
        config.apply_overrides(overrides);

        config
            .validate()
            .map_err(|errors| TailError::invalid_config("config", errors.join("; ")))?;
        Ok(config)
    }

    /// Reads a configuration file; the format follows the extension.
    ///
    /// # Errors
    /// Returns an error for unreadable files, unknown extensions and parse failures.
    pub fn from_file(path: &Path) -> TailResult<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => serde_yml::from_str(&content).map_err(TailError::config_parse),
            Some("json") => serde_json::from_str(&content).map_err(TailError::config_parse),
            Some("toml") => toml::from_str(&content).map_err(TailError::config_parse),
            _ => Err(TailError::config_parse(
                "Unsupported configuration format. Use 'yaml', 'json' or 'toml'.",
            )),
        }
    }

    fn apply_env(&mut self) -> TailResult<()> {
        let defaults = Self::with_defaults();

        if self.server_url == defaults.server_url {
            if let Ok(url) = env::var("TAILVIEW_SERVER_URL") {
                self.server_url = url;
            }
        }
        if self.endpoint == defaults.endpoint {
            if let Ok(endpoint) = env::var("TAILVIEW_ENDPOINT") {
                self.endpoint = endpoint;
            }
        }
        if self.max_messages == defaults.max_messages {
            if let Ok(value) = env::var("TAILVIEW_MAX_MESSAGES") {
                self.max_messages = value.trim().parse().map_err(|_| {
                    TailError::invalid_config("TAILVIEW_MAX_MESSAGES", "must be a positive integer")
                })?;
            }
        }
        if self.logging.level == defaults.logging.level {
            if let Ok(level) = env::var("TAILVIEW_LOG_LEVEL") {
                self.logging.level = level;
            }
        }
        if self.auth_token.is_none() {
            if let Ok(token) = env::var("TAILVIEW_AUTH_TOKEN") {
                self.auth_token = Some(token).filter(|t| !t.is_empty());
            }
        }
        if self.export_dir.is_none() {
            if let Ok(dir) = env::var("TAILVIEW_EXPORT_DIR") {
                self.export_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.server_url {
            self.server_url.clone_from(url);
        }
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(max) = overrides.max_messages {
            self.max_messages = max;
        }
        if let Some(show) = overrides.show_timestamps {
            self.show_timestamps = show;
        }
        if let Some(dir) = &overrides.export_dir {
            self.export_dir = Some(dir.clone());
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level.clone_from(level);
        }
    }

    /// Validates the configuration, collecting every problem found.
    ///
    /// # Errors
    /// Returns one message per invalid setting.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_messages == 0 {
            errors.push("max_messages must be greater than 0".to_string());
        }

        match self.endpoint_url() {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                errors.push(format!("endpoint must use http or https, got '{}'", url.scheme()));
            }
            Ok(_) => {}
            Err(err) => errors.push(format!("endpoint is not a valid URL: {err}")),
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            errors.push("retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string());
        }

        for (name, value) in [
            ("debounce.selector_ms", self.debounce.selector_ms),
            ("debounce.search_ms", self.debounce.search_ms),
        ] {
            if value > MAX_DEBOUNCE_MS {
                errors.push(format!("{name} must be at most {MAX_DEBOUNCE_MS}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Absolute URL of the stream endpoint.
    ///
    /// # Errors
    /// Returns [`TailError::InvalidEndpoint`] when the URLs cannot be resolved.
    pub fn endpoint_url(&self) -> TailResult<Url> {
        resolve_endpoint(&Url::parse(&self.server_url)?, &self.endpoint)
    }

    /// Absolute URL of the date listing.
    ///
    /// # Errors
    /// Returns [`TailError::InvalidEndpoint`] when the URLs cannot be resolved.
    pub fn dates_url(&self) -> TailResult<Url> {
        resolve_endpoint(&Url::parse(&self.server_url)?, &self.dates_path)
    }

    /// Rendering options for buffered messages.
    #[must_use]
    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            show_timestamps: self.show_timestamps,
        }
    }

    /// Viewer options derived from this configuration.
    #[must_use]
    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            max_messages: self.max_messages,
            display: self.display_options(),
            debounce: self.debounce.delays(),
            export_dir: self.export_dir.clone(),
            ..ViewerOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_defaults() {
        let config = TailConfig::with_defaults();

        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.endpoint, "/api/events");
        assert_eq!(config.max_messages, 1000);
        assert!(config.show_timestamps);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut config = TailConfig::with_defaults();
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "http://localhost:8080/api/events"
        );
        assert_eq!(
            config.dates_url().unwrap().as_str(),
            "http://localhost:8080/dates"
        );

        config.endpoint = "https://events.example.com/stream".to_string();
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "https://events.example.com/stream"
        );
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = TailConfig::with_defaults();
        config.max_messages = 0;
        config.server_url = "not a url".to_string();
        config.logging.level = "loud".to_string();
        config.retry.initial_delay_ms = 60_000;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("max_messages"));
        assert!(errors[2].contains("logging.level"));
    }

    #[test]
    fn test_non_http_endpoint_is_rejected() {
        let mut config = TailConfig::with_defaults();
        config.endpoint = "ftp://example.com/feed".to_string();
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("http or https"));
    }

    #[test]
    fn test_derived_settings() {
        let mut config = TailConfig::with_defaults();
        config.show_timestamps = false;
        config.debounce.search_ms = 250;
        config.retry.max_attempts = 0;

        let options = config.viewer_options();
        assert!(!options.display.show_timestamps);
        assert_eq!(options.debounce.search, Duration::from_millis(250));
        assert_eq!(options.debounce.selector, Duration::from_millis(100));
        assert!(!config.retry.policy().allows(0));
    }

    #[test]
    fn test_oversized_debounce_is_rejected() {
        let mut config = TailConfig::with_defaults();
        config.debounce.selector_ms = MAX_DEBOUNCE_MS;
        assert!(config.validate().is_ok());

        config.debounce.search_ms = u64::MAX;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec!["debounce.search_ms must be at most 60000".to_string()]);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Text.to_string(), "text");
    }
}
