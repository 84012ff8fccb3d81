use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use url::Url;

use super::{NoticeSender, ReadyState, StreamHandle, Transport};
use crate::{
    error::{TailError, TailResult},
    sse::SseFrame,
};

/// In-process transport driven by hand.
///
/// Every `open` is recorded as a [`MemoryConnection`] whose methods inject
/// the notices a real transport would produce. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    connections: Vec<MemoryConnection>,
    refuse_next: Option<String>,
}

impl MemoryTransport {
    /// Creates a transport with no recorded connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.lock().refuse_next = Some(reason.into());
    }

    /// Number of streams opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Every connection opened so far, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<MemoryConnection> {
        self.lock().connections.clone()
    }

    /// The most recently opened connection.
    #[must_use]
    pub fn latest(&self) -> Option<MemoryConnection> {
        self.lock().connections.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    fn open(&self, url: Url, notices: NoticeSender) -> TailResult<StreamHandle> {
        let mut state = self.lock();
        if let Some(reason) = state.refuse_next.take() {
            return Err(TailError::transport_open(reason));
        }

        let token = CancellationToken::new();
        state.connections.push(MemoryConnection {
            url,
            notices,
            token: token.clone(),
        });
        Ok(StreamHandle::detached(token))
    }
}

/// Controller for one stream opened through [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    url: Url,
    notices: NoticeSender,
    token: CancellationToken,
}

impl MemoryConnection {
    /// URL the stream was opened with.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Generation the owner assigned to this stream.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.notices.generation()
    }

    /// Whether the owner closed the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Acknowledges the open, as a server accepting the request would.
    pub fn open(&self) -> bool {
        self.notices.opened()
    }

    /// Delivers a decoded block.
    pub fn frame(&self, frame: SseFrame) -> bool {
        self.notices.frame(frame)
    }

    /// Pushes a block with the given event name, id and data.
    pub fn event(&self, event: Option<&str>, id: Option<&str>, data: &str) -> bool {
        self.frame(SseFrame {
            event: event.map(str::to_string),
            id: id.map(str::to_string),
            data: data.to_string(),
        })
    }

    /// Reports a failure without a cause.
    pub fn error(&self, ready_state: ReadyState) -> bool {
        self.notices.error(ready_state, None)
    }

    /// Reports a failure with the transport's description of it.
    pub fn error_with(&self, ready_state: ReadyState, detail: &str) -> bool {
        self.notices.error(ready_state, Some(detail.to_string()))
    }
}
