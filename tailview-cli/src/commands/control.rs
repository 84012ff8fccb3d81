//! Interactive control lines read from stdin while tailing.

use tailview_core::ConnectionKind;
use thiserror::Error;

/// Text printed by `help`.
pub const HELP: &str = "\
commands:
  connect              open the stream with the current filter
  disconnect           close the stream
  clear                empty the buffer and forget the last event id
  export               write the buffer to a file
  status               show connection state and filter
  dismiss              clear the displayed error
  conn <kind>|-        filter by connection kind (websocket, http, grpc, tcp, redis, mqtt)
  date <value>|-       filter by date
  tag add <n>          add a numeric tag
  tag rm <n>           remove a numeric tag
  search [term...]     filter by text; no term clears
  endpoint <url>       switch the stream endpoint; disconnect first
  help                 show this help
  quit | exit          stop tailing";

/// One parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Open the stream
    Connect,
    /// Close the stream
    Disconnect,
    /// Empty the buffer
    Clear,
    /// Write the buffer to a file
    Export,
    /// Print a status line
    Status,
    /// Clear the displayed error
    Dismiss,
    /// Print [`HELP`]
    Help,
    /// Stop tailing
    Quit,
    /// Filter by connection kind; `None` clears
    Connection(Option<ConnectionKind>),
    /// Filter by date; `None` clears
    Date(Option<String>),
    /// Select a tag
    AddTag(i64),
    /// Deselect a tag
    RemoveTag(i64),
    /// Filter by text; `None` clears
    Search(Option<String>),
    /// Switch to another stream endpoint
    Endpoint(String),
}

/// Why a control line was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlParseError {
    /// No such command
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    /// Known command, wrong arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Tag is not an integer
    #[error("invalid tag '{0}': expected an integer")]
    InvalidTag(String),

    /// Connection kind is not one of the known kinds
    #[error("unknown connection kind '{0}'")]
    UnknownConnection(String),
}

/// Parses one control line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ControlCommand>, ControlParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("connect", []) => ControlCommand::Connect,
        ("disconnect", []) => ControlCommand::Disconnect,
        ("clear", []) => ControlCommand::Clear,
        ("export", []) => ControlCommand::Export,
        ("status", []) => ControlCommand::Status,
        ("dismiss", []) => ControlCommand::Dismiss,
        ("help" | "?", _) => ControlCommand::Help,
        ("quit" | "exit", []) => ControlCommand::Quit,
        ("conn", ["-"]) => ControlCommand::Connection(None),
        ("conn", [kind]) => ControlCommand::Connection(Some(
            ConnectionKind::parse(kind)
                .map_err(|_| ControlParseError::UnknownConnection((*kind).to_string()))?,
        )),
        ("conn", _) => return Err(ControlParseError::Usage("conn <kind>|-")),
        ("date", ["-"]) => ControlCommand::Date(None),
        ("date", [value]) => ControlCommand::Date(Some((*value).to_string())),
        ("date", _) => return Err(ControlParseError::Usage("date <value>|-")),
        ("tag", ["add", tag]) => ControlCommand::AddTag(parse_tag(tag)?),
        ("tag", ["rm" | "remove", tag]) => ControlCommand::RemoveTag(parse_tag(tag)?),
        ("tag", _) => return Err(ControlParseError::Usage("tag add <n> | tag rm <n>")),
        ("search", []) => ControlCommand::Search(None),
        ("search", terms) => ControlCommand::Search(Some(terms.join(" "))),
        ("endpoint", [url]) => ControlCommand::Endpoint((*url).to_string()),
        ("endpoint", _) => return Err(ControlParseError::Usage("endpoint <url>")),
        (other, _) => return Err(ControlParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_tag(raw: &str) -> Result<i64, ControlParseError> {
    raw.parse()
        .map_err(|_| ControlParseError::InvalidTag(raw.to_string()))
}
