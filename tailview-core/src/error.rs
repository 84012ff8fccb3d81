//! # Error Types
//!
//! Errors surfaced by the viewer, its transports, and configuration loading.

use thiserror::Error;

/// Result type alias for viewer operations
pub type TailResult<T> = Result<T, TailError>;

/// Error type for every fallible operation in the crate
#[derive(Error, Debug)]
pub enum TailError {
    /// The stream or listing endpoint could not be turned into a URL
    #[error("Invalid endpoint: {details}")]
    InvalidEndpoint {
        /// Why the URL was rejected
        details: String,
    },

    /// The transport refused to open a stream
    #[error("Failed to open stream: {reason}")]
    TransportOpen {
        /// Transport's explanation
        reason: String,
    },

    /// A connection kind outside the known set was requested
    #[error("Unknown connection kind: {value}")]
    UnknownConnectionKind {
        /// The name as given
        value: String,
    },

    /// A date that the listing endpoint never offered was requested
    #[error("Date not available: {value}")]
    UnknownDate {
        /// The date as given
        value: String,
    },

    /// The endpoint cannot change while a stream is connecting or open
    #[error("Disconnect before changing the endpoint")]
    EndpointInUse,

    /// A configuration value failed validation
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfiguration {
        /// Setting or source that failed
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// A configuration file could not be parsed
    #[error("Failed to parse configuration: {details}")]
    ConfigParse {
        /// Parser output
        details: String,
    },

    /// The viewer task has stopped and no longer accepts commands
    #[error("Viewer is no longer running")]
    ViewerClosed,

    /// IO related errors
    #[error("IO error: {source}")]
    Io {
        /// Underlying IO error
        #[from]
        source: std::io::Error,
    },

    /// HTTP client errors
    #[error("HTTP error: {source}")]
    Http {
        /// Underlying client error
        #[from]
        source: reqwest::Error,
    },
}

impl TailError {
    /// Create a new invalid endpoint error
    #[must_use]
    pub fn invalid_endpoint<T: Into<String>>(details: T) -> Self {
        Self::InvalidEndpoint {
            details: details.into(),
        }
    }

    /// Create a new transport open error
    #[must_use]
    pub fn transport_open<T: Into<String>>(reason: T) -> Self {
        Self::TransportOpen {
            reason: reason.into(),
        }
    }

    /// Create a new invalid configuration error
    #[must_use]
    pub fn invalid_config<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration parse error
    #[must_use]
    pub fn config_parse<T: std::fmt::Display>(details: T) -> Self {
        Self::ConfigParse {
            details: details.to_string(),
        }
    }
}

impl From<url::ParseError> for TailError {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_endpoint(err.to_string())
    }
}
