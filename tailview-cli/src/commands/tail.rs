//! Follows the stream and prints events to stdout.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;
use tailview_core::{
    ConnectionKind, ConnectionState, DateCatalog, DisplayOptions, FilterCriteria, StreamEvent,
    TailError, ViewerHandle, ViewerStatus, config::ConfigOverrides, request::criteria_pairs, spawn_viewer,
    transport::HttpTransport,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::{RecvError, TryRecvError},
};
use tracing::warn;

use super::{
    build_client,
    control::{self, ControlCommand},
    resolve_config,
};
use crate::logging::initialize_tracing;

/// Flags of the `tail` subcommand
#[derive(Args, Debug, Default)]
pub struct TailArgs {
    /// Base URL of the event server
    #[arg(long, help = "Base URL of the event server (e.g., http://localhost:8080)")]
    pub server: Option<String>,

    /// Stream endpoint
    #[arg(long, help = "Stream endpoint, relative to the server or absolute (default: /api/events)")]
    pub endpoint: Option<String>,

    /// Connection kind filter
    #[arg(long, value_parser = parse_connection_kind)]
    pub connection: Option<ConnectionKind>,

    /// Date filter
    #[arg(long)]
    pub date: Option<String>,

    /// Numeric tag filter; repeat for several tags
    #[arg(long = "tag", allow_negative_numbers = true)]
    pub tags: Vec<i64>,

    /// Free-text search filter
    #[arg(long)]
    pub search: Option<String>,

    /// Resume after this event id
    #[arg(long)]
    pub last_event_id: Option<String>,

    /// Number of events kept in the buffer
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Print events without their arrival time
    #[arg(long)]
    pub no_timestamps: bool,

    /// Directory for exported files
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Exit after printing this many events
    #[arg(long)]
    pub count: Option<usize>,

    /// Read control commands from stdin (type `help` for a list)
    #[arg(long, short)]
    pub interactive: bool,

    /// Write the buffer to a file before exiting
    #[arg(long)]
    pub export_on_exit: bool,
}

fn parse_connection_kind(value: &str) -> Result<ConnectionKind, String> {
    ConnectionKind::parse(value).map_err(|_| {
        let known: Vec<String> = ConnectionKind::all().iter().map(ToString::to_string).collect();
        format!("expected one of {}", known.join(", "))
    })
}

enum Exit {
    Quit,
    CountReached,
    StreamClosed(String),
    ViewerStopped,
}

enum Flow {
    Continue,
    Quit,
}

/// Follows the stream until interrupted, the count is reached or the stream
/// closes for good.
pub async fn run(config_path: Option<&Path>, args: TailArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        server_url: args.server.clone(),
        endpoint: args.endpoint.clone(),
        max_messages: args.max_messages,
        show_timestamps: args.no_timestamps.then_some(false),
        export_dir: args.export_dir.clone(),
        log_level: None,
    };
    let config = resolve_config(config_path, &overrides)?;
    initialize_tracing(&config.logging);

    let client = build_client()?;
    let dates =
        DateCatalog::fetch_or_empty(&client, config.dates_url()?, config.auth_token.as_deref())
            .await;
    let criteria = initial_criteria(&args, &dates)?;

    let mut options = config.viewer_options();
    options.criteria = criteria;
    options.resume_from.clone_from(&args.last_event_id);
    let display = options.display;

    let transport = HttpTransport::new(client, config.retry.policy())
        .with_auth_token(config.auth_token.clone());
    let (viewer, task) = spawn_viewer(config.endpoint_url()?, transport, dates, options);

    let mut console = Console::new(display, args.count);
    let mut events = viewer.subscribe();
    let mut status = viewer.status_updates();
    let mut stdin = args
        .interactive
        .then(|| BufReader::new(tokio::io::stdin()).lines());

    if let Err(err) = viewer.connect().await {
        if args.interactive {
            eprintln!("error: {err}");
        } else {
            return Err(err).context("failed to open stream");
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit = loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => {
                    if console.print(&event) {
                        break Exit::CountReached;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "console fell behind, events skipped"),
                Err(RecvError::Closed) => break Exit::ViewerStopped,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Exit::ViewerStopped;
                }
                let current = status.borrow_and_update().clone();
                console.report(&current);
                if !args.interactive && !current.reconnect_pending {
                    if let ConnectionState::Closed(reason) = current.state {
                        break Exit::StreamClosed(reason);
                    }
                }
            }
            line = next_line(stdin.as_mut()) => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = execute_line(&viewer, &line).await? {
                        break Exit::Quit;
                    }
                }
                Ok(None) => stdin = None,
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    stdin = None;
                }
            },
            _ = &mut ctrl_c => break Exit::Quit,
        }
    };

    // Events delivered before the close notice are still queued.
    if let Exit::StreamClosed(_) = exit {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if console.print(&event) {
                        break;
                    }
                }
                Err(TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    }

    if args.export_on_exit {
        match viewer.export_to_file(None).await {
            Ok(path) => eprintln!("exported to {}", path.display()),
            Err(err) => eprintln!("export failed: {err}"),
        }
    }
    let _ = viewer.shutdown().await;
    let _ = task.await;

    match exit {
        Exit::StreamClosed(reason) if !console.count_reached() => {
            anyhow::bail!("stream closed: {reason}")
        }
        Exit::ViewerStopped => anyhow::bail!("viewer stopped unexpectedly"),
        _ => Ok(()),
    }
}

fn initial_criteria(args: &TailArgs, dates: &DateCatalog) -> Result<FilterCriteria> {
    if let Some(date) = args.date.as_deref() {
        if !dates.is_empty() && !dates.contains(date) {
            return Err(TailError::UnknownDate {
                value: date.to_string(),
            })
            .context("choose one of the dates listed by `tailview dates`");
        }
    }

    Ok(FilterCriteria {
        connection_kind: args.connection,
        date: args.date.clone().filter(|d| !d.is_empty()),
        tags: args.tags.iter().copied().collect::<BTreeSet<_>>(),
        search_term: args.search.clone().filter(|s| !s.is_empty()),
    })
}

async fn next_line(lines: Option<&mut Lines<BufReader<Stdin>>>) -> io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

async fn execute_line(viewer: &ViewerHandle, line: &str) -> Result<Flow> {
    let command = match control::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(Flow::Continue),
        Err(err) => {
            eprintln!("{err}");
            return Ok(Flow::Continue);
        }
    };

    match execute(viewer, command).await {
        Ok(flow) => Ok(flow),
        Err(TailError::ViewerClosed) => Err(TailError::ViewerClosed.into()),
        Err(err) => {
            eprintln!("error: {err}");
            Ok(Flow::Continue)
        }
    }
}

async fn execute(viewer: &ViewerHandle, command: ControlCommand) -> Result<Flow, TailError> {
    match command {
        ControlCommand::Connect => {
            if !viewer.connect().await? {
                eprintln!("already connected");
            }
        }
        ControlCommand::Disconnect => {
            viewer.disconnect().await?;
        }
        ControlCommand::Clear => {
            viewer.clear().await?;
            eprintln!("buffer cleared");
        }
        ControlCommand::Export => {
            let path = viewer.export_to_file(None).await?;
            eprintln!("exported to {}", path.display());
        }
        ControlCommand::Status => eprintln!("{}", describe(&viewer.status())),
        ControlCommand::Dismiss => viewer.dismiss_error().await?,
        ControlCommand::Help => eprintln!("{}", control::HELP),
        ControlCommand::Quit => return Ok(Flow::Quit),
        ControlCommand::Connection(kind) => {
            viewer.set_connection_kind(kind).await?;
        }
        ControlCommand::Date(date) => {
            viewer.set_date(date).await?;
        }
        ControlCommand::AddTag(tag) => {
            viewer.add_tag(tag).await?;
        }
        ControlCommand::RemoveTag(tag) => {
            viewer.remove_tag(tag).await?;
        }
        ControlCommand::Search(term) => {
            viewer.set_search(term).await?;
        }
        ControlCommand::Endpoint(endpoint) => {
            let url = viewer.set_endpoint(endpoint).await?;
            eprintln!("endpoint set to {url}");
        }
    }
    Ok(Flow::Continue)
}

/// One-line summary: label, counters, cursor and filter.
fn describe(status: &ViewerStatus) -> String {
    let filter: Vec<String> = criteria_pairs(&status.criteria)
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let mut line = format!(
        "status: {} | messages {} | connections {} | last id {}",
        status.label(),
        status.message_count,
        status.connection_count,
        status.last_event_id.as_deref().unwrap_or("-"),
    );
    if !filter.is_empty() {
        line.push_str(" | filter ");
        line.push_str(&filter.join(" "));
    }
    if let Some(error) = &status.error {
        line.push_str(" | error: ");
        line.push_str(error);
    }
    line
}

/// Stdout sink for events plus stderr status lines.
struct Console {
    display: DisplayOptions,
    limit: Option<usize>,
    printed: usize,
    last_reported: Option<(&'static str, Option<String>)>,
}

impl Console {
    fn new(display: DisplayOptions, limit: Option<usize>) -> Self {
        Self {
            display,
            limit,
            printed: 0,
            last_reported: None,
        }
    }

    /// Prints one event; returns whether the limit has been reached.
    fn print(&mut self, event: &StreamEvent) -> bool {
        if self.count_reached() {
            return true;
        }
        println!("{}", event.to_line(&self.display));
        self.printed += 1;
        self.count_reached()
    }

    fn count_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.printed >= limit)
    }

    /// Reports label or error changes on stderr.
    fn report(&mut self, status: &ViewerStatus) {
        let key = (status.label(), status.error.clone());
        if self.last_reported.as_ref() == Some(&key) {
            return;
        }
        match &key.1 {
            Some(error) => eprintln!("[{}] {error}", key.0),
            None => eprintln!("[{}]", key.0),
        }
        self.last_reported = Some(key);
    }
}
