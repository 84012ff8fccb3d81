//! # Configuration
//!
//! Viewer configuration resolved from defaults, an optional file,
//! `TAILVIEW_*` environment variables and command-line overrides.

/// Settings structs and the loading pipeline.
pub mod settings;


pub use settings::{ConfigOverrides, DebounceConfig, LogFormat, LoggingConfig, RetryConfig, TailConfig};
