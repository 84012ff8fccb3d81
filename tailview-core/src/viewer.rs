//! # Viewer
//!
//! The viewer actor owns the connection manager, the message buffer and the
//! query builder. Every mutation goes through its single loop, which selects
//! over handle commands, transport notices and the deferred-reconnect
//! deadline. Accepted events are broadcast; status is published on a watch
//! channel.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    buffer::{self, DEFAULT_MAX_MESSAGES, DisplayOptions, MessageBuffer},
    connection::ConnectionManager,
    dates::DateCatalog,
    error::{TailError, TailResult},
    models::{ConnectionKind, ConnectionState, FilterCriteria, ResumeCursor, StreamEvent},
    query::{CriteriaEdit, DebounceDelays, QueryBuilder},
    request::resolve_endpoint,
    transport::{Transport, TransportNotice},
};

const COMMAND_CAPACITY: usize = 32;

/// Startup settings for [`spawn_viewer`].
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    /// Buffer capacity.
    pub max_messages: usize,
    /// Rendering used by exports.
    pub display: DisplayOptions,
    /// Reconnect delays after filter edits.
    pub debounce: DebounceDelays,
    /// Where `export_to_file` writes when no directory is given.
    pub export_dir: Option<PathBuf>,
    /// Filter to start with.
    pub criteria: FilterCriteria,
    /// Resume from this id on the first connect.
    pub resume_from: Option<String>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            display: DisplayOptions::default(),
            debounce: DebounceDelays::default(),
            export_dir: None,
            criteria: FilterCriteria::default(),
            resume_from: None,
            event_capacity: 256,
        }
    }
}

/// Point-in-time view of the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewerStatus {
    /// Connection lifecycle state.
    pub state: ConnectionState,
    /// Streams opened so far.
    pub connection_count: u64,
    /// Resume cursor.
    pub last_event_id: Option<String>,
    /// Events currently buffered.
    pub message_count: usize,
    /// Events dropped to stay within capacity.
    pub evicted: u64,
    /// Error text for the user, if any.
    pub error: Option<String>,
    /// Active filter.
    pub criteria: FilterCriteria,
    /// A debounced reconnect is waiting.
    pub reconnect_pending: bool,
    /// Stream URL without filter parameters.
    pub endpoint: String,
}

impl ViewerStatus {
    /// Short human label for the connection indicator.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.state {
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Open => "Connected",
            _ if self.error.is_some() => "Disconnected",
            _ => "Not Connected",
        }
    }
}

/// Result of a filter edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// The criteria differ from before.
    pub changed: bool,
    /// A debounced reconnect was scheduled.
    pub reconnecting: bool,
}

#[derive(Debug)]
enum CriteriaChange {
    ConnectionKind(Option<ConnectionKind>),
    Date(Option<String>),
    AddTag(i64),
    RemoveTag(i64),
    Search(Option<String>),
}

#[derive(Debug)]
enum ViewerCommand {
    Connect(oneshot::Sender<TailResult<bool>>),
    Disconnect(oneshot::Sender<bool>),
    SetEndpoint(String, oneshot::Sender<TailResult<Url>>),
    Edit(CriteriaChange, oneshot::Sender<TailResult<EditOutcome>>),
    Clear(oneshot::Sender<()>),
    Export(oneshot::Sender<String>),
    ExportToFile(Option<PathBuf>, oneshot::Sender<TailResult<PathBuf>>),
    Snapshot(oneshot::Sender<Vec<StreamEvent>>),
    DismissError(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Starts a viewer streaming from `endpoint` through `transport`.
pub fn spawn_viewer<T>(
    endpoint: Url,
    transport: T,
    dates: DateCatalog,
    options: ViewerOptions,
) -> (ViewerHandle, JoinHandle<()>)
where
    T: Transport + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = broadcast::channel(options.event_capacity.max(1));

    let manager = ConnectionManager::new(endpoint, transport, notice_tx)
        .with_cursor(ResumeCursor::new(options.resume_from));
    let query = QueryBuilder::new(dates, options.debounce).with_criteria(options.criteria);

    let viewer = Viewer {
        manager,
        buffer: MessageBuffer::new(options.max_messages),
        query,
        display: options.display,
        export_dir: options.export_dir,
        events: event_tx,
        status: watch::Sender::new(ViewerStatus::default()),
    };
    viewer.publish_status();
    let status_rx = viewer.status.subscribe();

    let task = tokio::spawn(viewer.run(command_rx, notice_rx));
    let handle = ViewerHandle {
        commands: command_tx,
        status: status_rx,
        events: event_rx,
    };
    (handle, task)
}

struct Viewer<T: Transport> {
    manager: ConnectionManager<T>,
    buffer: MessageBuffer,
    query: QueryBuilder,
    display: DisplayOptions,
    export_dir: Option<PathBuf>,
    events: broadcast::Sender<StreamEvent>,
    status: watch::Sender<ViewerStatus>,
}

impl<T: Transport> Viewer<T> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ViewerCommand>,
        mut notices: mpsc::UnboundedReceiver<TransportNotice>,
    ) {
        info!(endpoint = %self.manager.endpoint(), "viewer started");
        loop {
            let deadline = self.manager.deadline();
            tokio::select! {
                biased;
                command = commands.recv() => {
                    // Commands observe every notice queued before them.
                    self.drain_notices(&mut notices);
                    match command {
                        Some(ViewerCommand::Shutdown(reply)) => {
                            self.manager.disconnect();
                            self.respond(reply, ());
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("all viewer handles dropped");
                            break;
                        }
                    }
                }
                Some(notice) = notices.recv() => {
                    self.handle_notice(notice);
                    self.publish_status();
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Err(err) = self.manager.poll_deferred(Instant::now()) {
                        warn!(error = %err, "deferred reconnect failed");
                    }
                    self.publish_status();
                }
            }
        }
        self.manager.disconnect();
        self.publish_status();
        info!("viewer stopped");
    }

    fn drain_notices(&mut self, notices: &mut mpsc::UnboundedReceiver<TransportNotice>) {
        for _ in 0..notices.len() {
            match notices.try_recv() {
                Ok(notice) => self.handle_notice(notice),
                Err(_) => break,
            }
        }
    }

    fn handle_notice(&mut self, notice: TransportNotice) {
        if let Some(event) = self.manager.handle_notice(notice, &mut self.buffer) {
            let _ = self.events.send(event);
        }
    }

    fn handle_command(&mut self, command: ViewerCommand) {
        match command {
            ViewerCommand::Connect(reply) => {
                let result = self.manager.connect(self.query.criteria());
                self.respond(reply, result);
            }
            ViewerCommand::Disconnect(reply) => {
                let disconnected = self.manager.disconnect();
                self.respond(reply, disconnected);
            }
            ViewerCommand::SetEndpoint(endpoint, reply) => {
                let result = resolve_endpoint(self.manager.endpoint(), &endpoint).and_then(|url| {
                    self.manager.set_endpoint(url.clone())?;
                    Ok(url)
                });
                self.respond(reply, result);
            }
            ViewerCommand::Edit(change, reply) => {
                let outcome = self.apply_edit(change);
                self.respond(reply, outcome);
            }
            ViewerCommand::Clear(reply) => {
                self.buffer.clear();
                self.manager.reset_cursor();
                self.respond(reply, ());
            }
            ViewerCommand::Export(reply) => {
                let text = self.buffer.export(&self.display);
                self.respond(reply, text);
            }
            ViewerCommand::ExportToFile(dir, reply) => {
                let dir = dir
                    .or_else(|| self.export_dir.clone())
                    .unwrap_or_else(|| PathBuf::from("."));
                let contents = self.buffer.export(&self.display);
                let result = buffer::write_export(&dir, &contents, Utc::now());
                if let Ok(path) = &result {
                    info!(path = %path.display(), messages = self.buffer.len(), "exported messages");
                }
                self.respond(reply, result);
            }
            ViewerCommand::Snapshot(reply) => {
                let events = self.buffer.snapshot();
                self.respond(reply, events);
            }
            ViewerCommand::DismissError(reply) => {
                self.manager.dismiss_error();
                self.respond(reply, ());
            }
            ViewerCommand::Shutdown(reply) => {
                self.manager.disconnect();
                self.respond(reply, ());
            }
        }
    }

    /// Publishes the resulting status before answering, so callers observe it.
    fn respond<R>(&self, reply: oneshot::Sender<R>, value: R) {
        self.publish_status();
        let _ = reply.send(value);
    }

    fn apply_edit(&mut self, change: CriteriaChange) -> TailResult<EditOutcome> {
        let edit: Option<CriteriaEdit> = match change {
            CriteriaChange::ConnectionKind(kind) => self.query.set_connection_kind(kind),
            CriteriaChange::Date(date) => self.query.set_date(date)?,
            CriteriaChange::AddTag(tag) => self.query.add_tag(tag),
            CriteriaChange::RemoveTag(tag) => self.query.remove_tag(tag),
            CriteriaChange::Search(term) => self.query.set_search(term),
        };

        let Some(edit) = edit else {
            return Ok(EditOutcome::default());
        };
        let reconnecting = self
            .manager
            .apply_criteria(&edit.criteria, edit.debounce, Instant::now());
        Ok(EditOutcome {
            changed: true,
            reconnecting,
        })
    }

    fn publish_status(&self) {
        let status = ViewerStatus {
            state: self.manager.state().clone(),
            connection_count: self.manager.connection_count(),
            last_event_id: self.manager.cursor().get().map(str::to_string),
            message_count: self.buffer.len(),
            evicted: self.buffer.evicted(),
            error: self.manager.error().map(str::to_string),
            criteria: self.query.criteria().clone(),
            reconnect_pending: self.manager.reconnect_pending(),
            endpoint: self.manager.endpoint().to_string(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Cloneable front door to a running viewer.
#[derive(Debug)]
pub struct ViewerHandle {
    commands: mpsc::Sender<ViewerCommand>,
    status: watch::Receiver<ViewerStatus>,
    events: broadcast::Receiver<StreamEvent>,
}

impl Clone for ViewerHandle {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            status: self.status.clone(),
            events: self.events.resubscribe(),
        }
    }
}

impl ViewerHandle {
    /// Opens the stream with the current criteria and cursor.
    ///
    /// Returns `false` when a stream was already connecting or open.
    ///
    /// # Errors
    /// Fails when the transport refuses to open or the viewer has stopped.
    pub async fn connect(&self) -> TailResult<bool> {
        self.request(ViewerCommand::Connect).await?
    }

    /// Closes the stream and cancels any pending reconnect.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn disconnect(&self) -> TailResult<bool> {
        self.request(ViewerCommand::Disconnect).await
    }

    /// Switches to another stream endpoint, relative to the current one or
    /// absolute. Returns the resolved URL.
    ///
    /// # Errors
    /// Fails with [`TailError::EndpointInUse`] while connected, with
    /// [`TailError::InvalidEndpoint`] for an unusable URL, or when the viewer
    /// has stopped.
    pub async fn set_endpoint(&self, endpoint: impl Into<String>) -> TailResult<Url> {
        let endpoint = endpoint.into();
        self.request(|reply| ViewerCommand::SetEndpoint(endpoint, reply))
            .await?
    }

    /// Filters by connection kind; `None` clears the filter.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn set_connection_kind(&self, kind: Option<ConnectionKind>) -> TailResult<EditOutcome> {
        self.edit(CriteriaChange::ConnectionKind(kind)).await
    }

    /// Filters by date; `None` clears the filter.
    ///
    /// # Errors
    /// Fails with [`TailError::UnknownDate`] for a date the server did not list.
    pub async fn set_date(&self, date: Option<String>) -> TailResult<EditOutcome> {
        self.edit(CriteriaChange::Date(date)).await
    }

    /// Adds a tag to the filter.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn add_tag(&self, tag: i64) -> TailResult<EditOutcome> {
        self.edit(CriteriaChange::AddTag(tag)).await
    }

    /// Removes a tag from the filter.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn remove_tag(&self, tag: i64) -> TailResult<EditOutcome> {
        self.edit(CriteriaChange::RemoveTag(tag)).await
    }

    /// Filters by free text; `None` or an empty term clears the filter.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn set_search(&self, term: Option<String>) -> TailResult<EditOutcome> {
        self.edit(CriteriaChange::Search(term)).await
    }

    /// Empties the buffer and forgets the resume cursor.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn clear(&self) -> TailResult<()> {
        self.request(ViewerCommand::Clear).await
    }

    /// Buffer contents as text, one line per event.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn export(&self) -> TailResult<String> {
        self.request(ViewerCommand::Export).await
    }

    /// Writes the export into `dir`, or the configured export directory.
    ///
    /// # Errors
    /// Fails on IO errors or when the viewer has stopped.
    pub async fn export_to_file(&self, dir: Option<PathBuf>) -> TailResult<PathBuf> {
        self.request(|reply| ViewerCommand::ExportToFile(dir, reply))
            .await?
    }

    /// Copy of the buffered events, oldest first.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn snapshot(&self) -> TailResult<Vec<StreamEvent>> {
        self.request(ViewerCommand::Snapshot).await
    }

    /// Clears the surfaced error.
    ///
    /// # Errors
    /// Fails when the viewer has stopped.
    pub async fn dismiss_error(&self) -> TailResult<()> {
        self.request(ViewerCommand::DismissError).await
    }

    /// Disconnects and stops the actor.
    ///
    /// # Errors
    /// Fails when the viewer has already stopped.
    pub async fn shutdown(&self) -> TailResult<()> {
        self.request(ViewerCommand::Shutdown).await
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> ViewerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified whenever the status changes.
    #[must_use]
    pub fn status_updates(&self) -> watch::Receiver<ViewerStatus> {
        self.status.clone()
    }

    /// Receiver for every event accepted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.resubscribe()
    }

    async fn edit(&self, change: CriteriaChange) -> TailResult<EditOutcome> {
        self.request(|reply| ViewerCommand::Edit(change, reply))
            .await?
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> ViewerCommand,
    ) -> TailResult<R> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| TailError::ViewerClosed)?;
        response.await.map_err(|_| TailError::ViewerClosed)
    }
}
