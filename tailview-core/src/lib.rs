#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! # tailview-core
//!
//! Building blocks for following a server-sent event stream like a live log
//! console: an incremental SSE decoder, a bounded message buffer, a filter
//! builder, a connection manager with resumable reconnects, and a viewer
//! actor that ties them together behind a cloneable handle.

/// Bounded message buffer and export
pub mod buffer;
/// Configuration loading and validation
pub mod config;
/// Connection state machine
pub mod connection;
/// Date listing
pub mod dates;
/// Error types
pub mod error;
/// Domain models
pub mod models;
/// Filter editing with debounce hints
pub mod query;
/// Stream URL construction
pub mod request;
/// Debounced reconnects
pub mod scheduler;
/// Server-sent event decoding
pub mod sse;
/// Stream transports
pub mod transport;
/// Viewer actor and handle
pub mod viewer;

pub use buffer::{DisplayOptions, MessageBuffer};
pub use config::TailConfig;
pub use connection::ConnectionManager;
pub use dates::DateCatalog;
pub use error::{TailError, TailResult};
pub use models::{ConnectionKind, ConnectionState, FilterCriteria, ResumeCursor, StreamEvent};
pub use query::{CriteriaEdit, DebounceDelays, QueryBuilder};
pub use transport::{
    NoticeKind, NoticeSender, ReadyState, RetryPolicy, StreamHandle, Transport, TransportNotice,
};
pub use viewer::{EditOutcome, ViewerHandle, ViewerOptions, ViewerStatus, spawn_viewer};
