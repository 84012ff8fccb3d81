//! # Connection Manager
//!
//! Owns at most one live stream. It builds the request from filter criteria
//! and the resume cursor, classifies transport errors, and reconnects after a
//! debounce when the criteria change while connected. It never retries on its
//! own; native retries belong to the transport.

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    buffer::MessageBuffer,
    error::{TailError, TailResult},
    models::{ConnectionState, FilterCriteria, ResumeCursor, StreamEvent},
    request::build_stream_url,
    scheduler::DeferredConnect,
    transport::{NoticeKind, NoticeSender, ReadyState, StreamHandle, Transport, TransportNotice},
};

/// Close reason when the peer ended the stream or the transport gave up.
pub const CLOSED_BY_SERVER: &str = "connection closed by server";
/// Surfaced while the transport retries on its own.
pub const RECONNECTING: &str = "reconnecting to server...";
/// Close reason for any other transport failure.
pub const CONNECTION_ERROR: &str = "connection error";

/// Lifecycle owner for the viewer's single stream.
#[derive(Debug)]
pub struct ConnectionManager<T: Transport> {
    endpoint: Url,
    transport: T,
    notices: mpsc::UnboundedSender<TransportNotice>,
    state: ConnectionState,
    cursor: ResumeCursor,
    generation: u64,
    handle: Option<StreamHandle>,
    connection_count: u64,
    error: Option<String>,
    deferred: DeferredConnect,
    last_received_at: Option<DateTime<Utc>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates an idle manager; transports report back through `notices`.
    #[must_use]
    pub fn new(endpoint: Url, transport: T, notices: mpsc::UnboundedSender<TransportNotice>) -> Self {
        Self {
            endpoint,
            transport,
            notices,
            state: ConnectionState::Idle,
            cursor: ResumeCursor::default(),
            generation: 0,
            handle: None,
            connection_count: 0,
            error: None,
            deferred: DeferredConnect::new(),
            last_received_at: None,
        }
    }

    /// Starts from a known cursor instead of the beginning of the stream.
    #[must_use]
    pub fn with_cursor(mut self, cursor: ResumeCursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Opens a stream for `criteria`.
    ///
    /// Returns `Ok(false)` without touching anything when a stream is already
    /// connecting or open.
    ///
    /// # Errors
    /// Returns the transport's error when the stream cannot be opened; the
    /// manager is left `Closed` with the error surfaced.
    pub fn connect(&mut self, criteria: &FilterCriteria) -> TailResult<bool> {
        if self.state.is_active() {
            debug!(state = %self.state, "connect ignored, stream already active");
            return Ok(false);
        }

        self.deferred.cancel();
        self.generation += 1;
        self.last_received_at = None;
        let url = build_stream_url(&self.endpoint, criteria, self.cursor.get());
        let sender = NoticeSender::new(self.generation, self.notices.clone());
        self.state = ConnectionState::Connecting;

        match self.transport.open(url.clone(), sender) {
            Ok(handle) => {
                info!(%url, generation = self.generation, "opening stream");
                self.handle = Some(handle);
                Ok(true)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(%url, error = %message, "failed to open stream");
                self.state = ConnectionState::Closed(message.clone());
                self.error = Some(message);
                Err(err)
            }
        }
    }

    /// Applies one transport notice.
    ///
    /// Notices from an older generation, or arriving after teardown, are
    /// dropped. Returns the event appended to `buffer`, if any.
    pub fn handle_notice(
        &mut self,
        notice: TransportNotice,
        buffer: &mut MessageBuffer,
    ) -> Option<StreamEvent> {
        if notice.generation != self.generation || self.handle.is_none() {
            debug!(
                notice_generation = notice.generation,
                current = self.generation,
                "ignoring stale transport notice"
            );
            return None;
        }

        match notice.kind {
            NoticeKind::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Open;
                    self.connection_count += 1;
                    counter!("tailview_connections_opened_total").increment(1);
                    info!(
                        generation = self.generation,
                        connections = self.connection_count,
                        "stream open"
                    );
                }
                self.error = None;
                None
            }
            NoticeKind::Frame(frame) => {
                let now = Utc::now();
                let received_at = match self.last_received_at {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                self.last_received_at = Some(received_at);

                if let Some(id) = frame.id.as_deref() {
                    self.cursor.advance(id);
                }
                let event = StreamEvent::from_frame(frame, received_at);
                counter!("tailview_events_received_total").increment(1);
                buffer.append(event.clone());
                Some(event)
            }
            NoticeKind::Error {
                ready_state,
                detail,
            } => {
                counter!("tailview_transport_errors_total").increment(1);
                let detail = detail.unwrap_or_default();
                match ready_state {
                    ReadyState::Closed => {
                        info!(%detail, "stream closed by server");
                        self.teardown();
                        self.fail(CLOSED_BY_SERVER, &detail);
                    }
                    ReadyState::Connecting => {
                        info!(%detail, "transport reconnecting");
                        self.state = ConnectionState::Connecting;
                        self.error = Some(RECONNECTING.to_string());
                    }
                    ReadyState::Open => {
                        warn!(%detail, "stream error");
                        self.teardown();
                        self.fail(CONNECTION_ERROR, &detail);
                    }
                }
                None
            }
        }
    }

    /// Closes the stream and cancels any deferred reconnect.
    ///
    /// Idempotent. The cursor is kept. Returns whether anything was torn down.
    pub fn disconnect(&mut self) -> bool {
        let cancelled = self.deferred.cancel();
        let had_stream = self.handle.is_some();
        self.teardown();
        if had_stream || cancelled {
            info!(generation = self.generation, "disconnected");
        }
        self.state = ConnectionState::Idle;
        self.error = None;
        had_stream || cancelled
    }

    /// Reconnects with `criteria` after `delay` when a stream is active or a
    /// reconnect is already pending. Returns whether one was scheduled.
    pub fn apply_criteria(&mut self, criteria: &FilterCriteria, delay: Duration, now: Instant) -> bool {
        if !self.state.is_active() && !self.deferred.is_pending() {
            return false;
        }

        self.disconnect();
        let ticket = self.deferred.schedule(criteria.clone(), delay, now);
        debug!(ticket, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "reconnect scheduled");
        true
    }

    /// Fires the deferred reconnect if it is due.
    ///
    /// # Errors
    /// Propagates the error of the resulting [`connect`](Self::connect).
    pub fn poll_deferred(&mut self, now: Instant) -> TailResult<bool> {
        match self.deferred.take_due(now) {
            Some(criteria) => self.connect(&criteria),
            None => Ok(false),
        }
    }

    /// When the deferred reconnect is due, if one is pending.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deferred.deadline()
    }

    /// Whether a debounced reconnect is waiting to fire.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.deferred.is_pending()
    }

    /// Forgets the resume cursor; the next connect starts live.
    pub fn reset_cursor(&mut self) {
        self.cursor.clear();
    }

    /// Id the next connect resumes after.
    #[must_use]
    pub fn cursor(&self) -> &ResumeCursor {
        &self.cursor
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// `Connecting` or `Open`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Streams opened over this manager's lifetime.
    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.connection_count
    }

    /// Error text shown to the user, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Clears the surfaced error; the state is left alone.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Generation of the most recent connect or teardown.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Base URL that filter parameters are added to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Points later connects at `endpoint`.
    ///
    /// A pending deferred reconnect picks up the new endpoint when it fires.
    ///
    /// # Errors
    /// Returns [`TailError::EndpointInUse`] while a stream is connecting or
    /// open.
    pub fn set_endpoint(&mut self, endpoint: Url) -> TailResult<()> {
        if self.state.is_active() {
            return Err(TailError::EndpointInUse);
        }
        info!(from = %self.endpoint, to = %endpoint, "endpoint changed");
        self.endpoint = endpoint;
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            self.generation += 1;
        }
    }

    fn fail(&mut self, reason: &str, detail: &str) {
        self.state = ConnectionState::Closed(reason.to_string());
        self.error = Some(if detail.is_empty() {
            reason.to_string()
        } else {
            format!("{reason}: {detail}")
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        manager: ConnectionManager<MemoryTransport>,
        transport: MemoryTransport,
        notices: UnboundedReceiver<TransportNotice>,
        buffer: MessageBuffer,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, notices) = mpsc::unbounded_channel();
            let transport = MemoryTransport::new();
            let endpoint = Url::parse("http://localhost:8080/api/events").unwrap();
            Self {
                manager: ConnectionManager::new(endpoint, transport.clone(), tx),
                transport,
                notices,
                buffer: MessageBuffer::new(10),
            }
        }

        /// Feeds every queued notice to the manager.
        fn pump(&mut self) {
            while let Ok(notice) = self.notices.try_recv() {
                self.manager.handle_notice(notice, &mut self.buffer);
            }
        }

        fn open(&mut self, criteria: &FilterCriteria) {
            assert!(self.manager.connect(criteria).unwrap());
            self.transport.latest().unwrap().open();
            self.pump();
        }
    }

    #[test]
    fn connect_twice_opens_once() {
        let mut h = Harness::new();
        let criteria = FilterCriteria::default();

        assert!(h.manager.connect(&criteria).unwrap());
        assert!(!h.manager.connect(&criteria).unwrap());
        assert_eq!(h.transport.open_count(), 1);
        assert_eq!(h.manager.state(), &ConnectionState::Connecting);
    }

    #[test]
    fn open_ack_counts_and_clears_error() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());

        assert_eq!(h.manager.state(), &ConnectionState::Open);
        assert_eq!(h.manager.connection_count(), 1);
        assert_eq!(h.manager.error(), None);
    }

    #[test]
    fn frames_advance_cursor_only_with_server_ids() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        let connection = h.transport.latest().unwrap();

        connection.event(None, Some("41"), "first");
        connection.event(Some("heartbeat"), None, "");
        h.pump();

        assert_eq!(h.manager.cursor().get(), Some("41"));
        let events = h.buffer.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "41");
        assert_eq!(events[1].payload, "heartbeat");
        assert!(events[0].received_at <= events[1].received_at);
    }

    #[test]
    fn closed_by_peer_keeps_cursor_and_buffer_then_resumes() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        let connection = h.transport.latest().unwrap();
        connection.event(None, Some("evt-7"), "payload");
        connection.error(ReadyState::Closed);
        h.pump();

        assert_eq!(
            h.manager.state(),
            &ConnectionState::Closed(CLOSED_BY_SERVER.to_string())
        );
        assert_eq!(h.manager.error(), Some(CLOSED_BY_SERVER));
        assert_eq!(h.manager.cursor().get(), Some("evt-7"));
        assert_eq!(h.buffer.len(), 1);
        assert!(connection.is_closed());

        assert!(h.manager.connect(&FilterCriteria::default()).unwrap());
        let reopened = h.transport.latest().unwrap();
        assert_eq!(reopened.url().query(), Some("lastEventId=evt-7"));
    }

    #[test]
    fn native_retry_keeps_handle_and_reports_reconnecting() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        let connection = h.transport.latest().unwrap();

        connection.error(ReadyState::Connecting);
        h.pump();
        assert_eq!(h.manager.state(), &ConnectionState::Connecting);
        assert_eq!(h.manager.error(), Some(RECONNECTING));
        assert!(!connection.is_closed());

        connection.open();
        h.pump();
        assert_eq!(h.manager.state(), &ConnectionState::Open);
        assert_eq!(h.manager.connection_count(), 2);
        assert_eq!(h.manager.error(), None);
    }

    #[test]
    fn other_errors_close_with_generic_reason() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        h.transport.latest().unwrap().error(ReadyState::Open);
        h.pump();

        assert_eq!(
            h.manager.state(),
            &ConnectionState::Closed(CONNECTION_ERROR.to_string())
        );
    }

    #[test]
    fn transport_detail_is_surfaced_with_reason() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        h.transport
            .latest()
            .unwrap()
            .error_with(ReadyState::Closed, "server responded with 404 Not Found");
        h.pump();

        assert_eq!(
            h.manager.state(),
            &ConnectionState::Closed(CLOSED_BY_SERVER.to_string())
        );
        assert_eq!(
            h.manager.error(),
            Some("connection closed by server: server responded with 404 Not Found")
        );

        h.manager.connect(&FilterCriteria::default()).unwrap();
        h.transport.latest().unwrap().error_with(ReadyState::Open, "body read failed");
        h.pump();
        assert_eq!(h.manager.error(), Some("connection error: body read failed"));
    }

    #[test]
    fn endpoint_changes_only_while_inactive() {
        let mut h = Harness::new();
        let other = Url::parse("http://localhost:9090/feed?token=abc").unwrap();
        h.open(&FilterCriteria::default());

        assert!(matches!(
            h.manager.set_endpoint(other.clone()),
            Err(TailError::EndpointInUse)
        ));
        assert_eq!(h.manager.endpoint().path(), "/api/events");

        h.manager.disconnect();
        h.manager.set_endpoint(other).unwrap();
        h.manager.connect(&FilterCriteria::default().with_tag(2)).unwrap();

        assert_eq!(
            h.transport.latest().unwrap().url().as_str(),
            "http://localhost:9090/feed?token=abc&tags=2"
        );
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        let old = h.transport.latest().unwrap();

        h.manager.disconnect();
        h.open(&FilterCriteria::default());

        old.event(None, Some("ghost"), "late");
        old.error(ReadyState::Closed);
        h.pump();

        assert_eq!(h.manager.state(), &ConnectionState::Open);
        assert!(h.buffer.is_empty());
        assert_eq!(h.manager.cursor().get(), None);
    }

    #[test]
    fn disconnect_is_idempotent_and_keeps_cursor() {
        let mut h = Harness::new();
        h.open(&FilterCriteria::default());
        h.transport.latest().unwrap().event(None, Some("3"), "x");
        h.pump();

        assert!(h.manager.disconnect());
        assert!(!h.manager.disconnect());
        assert_eq!(h.manager.state(), &ConnectionState::Idle);
        assert_eq!(h.manager.cursor().get(), Some("3"));
        assert!(h.transport.latest().unwrap().is_closed());
    }

    #[test]
    fn refused_open_surfaces_error() {
        let mut h = Harness::new();
        h.transport.refuse_next("bad endpoint");

        assert!(h.manager.connect(&FilterCriteria::default()).is_err());
        assert!(matches!(h.manager.state(), ConnectionState::Closed(reason) if reason.contains("bad endpoint")));
        assert!(h.manager.error().is_some());

        assert!(h.manager.connect(&FilterCriteria::default()).unwrap());
    }

    #[test]
    fn criteria_change_while_idle_does_nothing() {
        let mut h = Harness::new();
        let now = Instant::now();
        let criteria = FilterCriteria::default().with_tag(5);

        assert!(!h.manager.apply_criteria(&criteria, Duration::from_millis(100), now));
        assert!(!h.manager.reconnect_pending());
    }

    #[test]
    fn criteria_change_while_open_reconnects_after_debounce() {
        let mut h = Harness::new();
        let now = Instant::now();
        h.open(&FilterCriteria::default());
        let criteria = FilterCriteria::default().with_tag(5);

        assert!(h.manager.apply_criteria(&criteria, Duration::from_millis(100), now));
        assert_eq!(h.manager.state(), &ConnectionState::Idle);
        assert!(!h.manager.poll_deferred(now + Duration::from_millis(50)).unwrap());
        assert!(h.manager.poll_deferred(now + Duration::from_millis(100)).unwrap());

        assert_eq!(h.transport.open_count(), 2);
        assert_eq!(h.transport.latest().unwrap().url().query(), Some("tags=5"));
    }

    #[test]
    fn rapid_edits_collapse_into_latest_criteria() {
        let mut h = Harness::new();
        let now = Instant::now();
        h.open(&FilterCriteria::default());

        let first = FilterCriteria::default().with_search(Some("d".into()));
        let second = FilterCriteria::default().with_search(Some("disk".into()));
        h.manager
            .apply_criteria(&first, Duration::from_millis(500), now);
        assert!(h.manager.apply_criteria(
            &second,
            Duration::from_millis(500),
            now + Duration::from_millis(200)
        ));

        assert!(!h.manager.poll_deferred(now + Duration::from_millis(600)).unwrap());
        assert!(h.manager.poll_deferred(now + Duration::from_millis(700)).unwrap());
        assert_eq!(h.transport.open_count(), 2);
        assert_eq!(
            h.transport.latest().unwrap().url().query(),
            Some("search=disk")
        );
    }

    #[test]
    fn disconnect_cancels_deferred_reconnect() {
        let mut h = Harness::new();
        let now = Instant::now();
        h.open(&FilterCriteria::default());
        h.manager
            .apply_criteria(&FilterCriteria::default().with_tag(1), Duration::from_millis(100), now);

        h.manager.disconnect();

        assert!(!h.manager.poll_deferred(now + Duration::from_secs(1)).unwrap());
        assert_eq!(h.transport.open_count(), 1);
    }

    #[test]
    fn manual_connect_supersedes_deferred_reconnect() {
        let mut h = Harness::new();
        let now = Instant::now();
        h.open(&FilterCriteria::default());
        h.manager
            .apply_criteria(&FilterCriteria::default().with_tag(1), Duration::from_millis(100), now);

        assert!(h.manager.connect(&FilterCriteria::default()).unwrap());
        assert!(!h.manager.reconnect_pending());
        assert!(!h.manager.poll_deferred(now + Duration::from_secs(1)).unwrap());
        assert_eq!(h.transport.open_count(), 2);
    }
}
