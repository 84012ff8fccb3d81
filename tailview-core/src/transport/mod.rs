//! # Transports
//!
//! A transport opens one stream per call and pushes what happens on it back
//! to the connection manager as [`TransportNotice`]s. Every notice carries the
//! generation of the `connect` call that created it, so notices from a
//! transport that was already torn down can be told apart and dropped.

/// HTTP streaming with `reqwest`.
pub mod http;
/// Hand-driven transport for tests and embedding.
pub mod memory;

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{error::TailResult, sse::SseFrame};

pub use http::HttpTransport;
pub use memory::{MemoryConnection, MemoryTransport};

/// Transport-level view of the connection, mirroring `EventSource.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Retrying on its own.
    Connecting,
    /// Receiving events.
    Open,
    /// Gave up or was closed by the peer.
    Closed,
}

/// What a transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The server accepted the stream.
    Opened,
    /// One decoded event block.
    Frame(SseFrame),
    /// The stream failed or ended.
    Error {
        /// Where the transport stands after the failure.
        ready_state: ReadyState,
        /// Human-readable cause, when the transport knows one.
        detail: Option<String>,
    },
}

/// A notice tagged with the generation of the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportNotice {
    /// Generation of the `connect` call that opened the stream.
    pub generation: u64,
    /// What happened.
    pub kind: NoticeKind,
}

/// Sending side handed to a transport for one connection.
///
/// Each method returns `false` once the receiving viewer is gone, which
/// transports use as a signal to stop.
#[derive(Debug, Clone)]
pub struct NoticeSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportNotice>,
}

impl NoticeSender {
    /// Binds `tx` to one connection generation.
    #[must_use]
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TransportNotice>) -> Self {
        Self { generation, tx }
    }

    /// Generation every notice from this sender carries.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports that the stream opened.
    pub fn opened(&self) -> bool {
        self.send(NoticeKind::Opened)
    }

    /// Forwards one decoded block.
    pub fn frame(&self, frame: SseFrame) -> bool {
        self.send(NoticeKind::Frame(frame))
    }

    /// Reports a failure and the state the transport is left in.
    pub fn error(&self, ready_state: ReadyState, detail: Option<String>) -> bool {
        self.send(NoticeKind::Error {
            ready_state,
            detail,
        })
    }

    /// Whether the receiving side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, kind: NoticeKind) -> bool {
        self.tx
            .send(TransportNotice {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

/// Owner's grip on an open stream. Closing (or dropping) it stops the transport.
#[derive(Debug)]
pub struct StreamHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Wraps the transport's task and the token that stops it.
    #[must_use]
    pub fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            token,
            task: Some(task),
        }
    }

    /// A handle for transports that do not run their own task.
    #[must_use]
    pub fn detached(token: CancellationToken) -> Self {
        Self { token, task: None }
    }

    /// Cancels the stream. Idempotent.
    pub fn close(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens streams for the connection manager.
pub trait Transport: Send {
    /// Starts streaming from `url`, reporting through `notices`.
    ///
    /// Must not block; long-lived work belongs in a spawned task owned by the
    /// returned handle.
    ///
    /// # Errors
    /// Returns an error when the stream cannot even be started.
    fn open(&self, url: Url, notices: NoticeSender) -> TailResult<StreamHandle>;
}

/// Bounded exponential backoff for transport-native retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after a failure; zero disables retrying.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` failed retries.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `server_hint` is the stream's `retry:` value and replaces the initial
    /// delay as the base when present.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        let base = server_hint.unwrap_or(self.initial_delay);
        let factor = 1u32 << attempt.min(6);
        base.saturating_mul(factor).min(self.max_delay)
    }
}
