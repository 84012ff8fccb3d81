use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the viewer's single stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never connected, or disconnected on request
    #[default]
    Idle,
    /// Handle created, waiting for the open notice
    Connecting,
    /// Receiving events
    Open,
    /// Torn down; carries a human-readable reason.
    Closed(String),
}

impl ConnectionState {
    /// `Connecting` or `Open`: a transport handle is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed(reason) if reason.is_empty() => write!(f, "closed"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Id of the most recent server-identified event, replayed on reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor(Option<String>);

impl ResumeCursor {
    /// Cursor starting at `last_event_id`; empty ids leave it unset.
    #[must_use]
    pub fn new(last_event_id: Option<String>) -> Self {
        Self(last_event_id.filter(|id| !id.is_empty()))
    }

    /// Current id, if any.
    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Moves the cursor forward; empty ids are ignored.
    pub fn advance(&mut self, id: &str) {
        if !id.is_empty() {
            self.0 = Some(id.to_string());
        }
    }

    /// Forgets the id.
    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// Whether an id is held.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}
