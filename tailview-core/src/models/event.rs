use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{buffer::DisplayOptions, sse::SseFrame};

/// Event kind assigned to frames that carry no `event:` field.
pub const DEFAULT_EVENT_KIND: &str = "message";

const HEARTBEAT_PLACEHOLDER: &str = "heartbeat";
const ERROR_PLACEHOLDER: &str = "error event received";

/// One event accepted from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Server-supplied id, or a locally generated UUID when the block had none.
    pub id: String,
    /// Local arrival time.
    pub received_at: DateTime<Utc>,
    /// Raw `data:` body.
    pub payload: String,
    /// `message` unless the block named its type.
    pub event_kind: String,
}

impl StreamEvent {
    /// Creates an event from already-known parts.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        received_at: DateTime<Utc>,
        payload: impl Into<String>,
        event_kind: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            received_at,
            payload: payload.into(),
            event_kind: event_kind.into(),
        }
    }

    /// Builds the event for a decoded frame received at `received_at`.
    ///
    /// Blank ids are replaced by a fresh UUID, and empty `heartbeat`/`error`
    /// payloads get a readable placeholder.
    #[must_use]
    pub fn from_frame(frame: SseFrame, received_at: DateTime<Utc>) -> Self {
        let event_kind = match frame.event {
            Some(kind) if !kind.is_empty() => kind,
            _ => DEFAULT_EVENT_KIND.to_string(),
        };
        let id = match frame.id {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let payload = if frame.data.is_empty() {
            placeholder_payload(&event_kind).map_or(frame.data, str::to_string)
        } else {
            frame.data
        };

        Self {
            id,
            received_at,
            payload,
            event_kind,
        }
    }

    /// Whether the event was sent without a named type.
    #[must_use]
    pub fn is_default_kind(&self) -> bool {
        self.event_kind == DEFAULT_EVENT_KIND
    }

    /// Renders the event as a single console/export line.
    #[must_use]
    pub fn to_line(&self, options: &DisplayOptions) -> String {
        let mut line = String::with_capacity(self.payload.len() + 40);
        if options.show_timestamps {
            line.push('[');
            line.push_str(
                &self
                    .received_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            line.push_str("] ");
        }
        if !self.is_default_kind() {
            line.push('(');
            line.push_str(&self.event_kind);
            line.push_str(") ");
        }
        line.push_str(&self.payload);
        line
    }
}

fn placeholder_payload(event_kind: &str) -> Option<&'static str> {
    match event_kind {
        "heartbeat" => Some(HEARTBEAT_PLACEHOLDER),
        "error" => Some(ERROR_PLACEHOLDER),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn frame(event: Option<&str>, id: Option<&str>, data: &str) -> SseFrame {
        SseFrame {
            event: event.map(str::to_string),
            id: id.map(str::to_string),
            data: data.to_string(),
        }
    }

    #[test]
    fn from_frame_keeps_server_id_and_kind() {
        let event = StreamEvent::from_frame(frame(Some("heartbeat"), Some("42"), "beat"), at_noon());
        assert_eq!(event.id, "42");
        assert_eq!(event.event_kind, "heartbeat");
        assert_eq!(event.payload, "beat");
        assert!(!event.is_default_kind());
    }

    #[test]
    fn from_frame_generates_id_when_missing() {
        let first = StreamEvent::from_frame(frame(None, None, "a"), at_noon());
        let second = StreamEvent::from_frame(frame(None, Some(""), "b"), at_noon());
        assert!(!first.id.is_empty());
        assert!(!second.id.is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(first.event_kind, DEFAULT_EVENT_KIND);
    }

    #[test]
    fn from_frame_fills_placeholders_for_empty_named_events() {
        let heartbeat = StreamEvent::from_frame(frame(Some("heartbeat"), None, ""), at_noon());
        let error = StreamEvent::from_frame(frame(Some("error"), None, ""), at_noon());
        let custom = StreamEvent::from_frame(frame(Some("custom"), None, ""), at_noon());
        assert_eq!(heartbeat.payload, "heartbeat");
        assert_eq!(error.payload, "error event received");
        assert_eq!(custom.payload, "");
    }

    #[test]
    fn to_line_respects_display_options() {
        let plain = StreamEvent::new("1", at_noon(), "hello", "message");
        let named = StreamEvent::new("2", at_noon(), "oops", "error");

        let with_ts = DisplayOptions {
            show_timestamps: true,
        };
        let without_ts = DisplayOptions {
            show_timestamps: false,
        };

        assert_eq!(plain.to_line(&with_ts), "[2024-05-01T12:00:00.000Z] hello");
        assert_eq!(plain.to_line(&without_ts), "hello");
        assert_eq!(
            named.to_line(&with_ts),
            "[2024-05-01T12:00:00.000Z] (error) oops"
        );
        assert_eq!(named.to_line(&without_ts), "(error) oops");
    }
}
