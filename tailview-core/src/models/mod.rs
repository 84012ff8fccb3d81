//! # Models
//!
//! Data carried between the transport, the buffer and the user.

/// Accepted stream events.
pub mod event;
/// Filter criteria and connection kinds.
pub mod filter;
/// Connection lifecycle and the resume cursor.
pub mod state;

pub use event::{DEFAULT_EVENT_KIND, StreamEvent};
pub use filter::{ConnectionKind, FilterCriteria};
pub use state::{ConnectionState, ResumeCursor};
