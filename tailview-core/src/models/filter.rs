use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{TailError, TailResult};

/// The fixed set of connection kinds a stream can be filtered by.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionKind {
    /// WebSocket sessions
    Websocket,
    /// Plain HTTP requests
    Http,
    /// gRPC calls
    Grpc,
    /// Raw TCP sockets
    Tcp,
    /// Redis clients
    Redis,
    /// MQTT brokers
    Mqtt,
}

impl ConnectionKind {
    /// Every selectable kind, in display order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }

    /// Parses a kind by name, reporting unknown names as [`TailError::UnknownConnectionKind`].
    ///
    /// # Errors
    /// Returns an error when `value` is not one of the known kinds.
    pub fn parse(value: &str) -> TailResult<Self> {
        Self::from_str(value.trim()).map_err(|_| TailError::UnknownConnectionKind {
            value: value.to_string(),
        })
    }
}

/// Filter values that shape the stream request.
///
/// Edits never mutate in place; each `with_*` method returns the edited copy
/// so the caller can compare old and new criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Selected connection kind
    pub connection_kind: Option<ConnectionKind>,
    /// Selected date, as listed by the server
    pub date: Option<String>,
    /// Selected tags, kept sorted
    pub tags: BTreeSet<i64>,
    /// Free-text search
    pub search_term: Option<String>,
}

impl FilterCriteria {
    /// Copy with the connection kind replaced.
    #[must_use]
    pub fn with_connection_kind(&self, kind: Option<ConnectionKind>) -> Self {
        Self {
            connection_kind: kind,
            ..self.clone()
        }
    }

    /// Copy with the date replaced; blank dates clear it.
    #[must_use]
    pub fn with_date(&self, date: Option<String>) -> Self {
        Self {
            date: non_empty(date),
            ..self.clone()
        }
    }

    /// Copy with `tag` selected.
    #[must_use]
    pub fn with_tag(&self, tag: i64) -> Self {
        let mut next = self.clone();
        next.tags.insert(tag);
        next
    }

    /// Copy with `tag` deselected.
    #[must_use]
    pub fn without_tag(&self, tag: i64) -> Self {
        let mut next = self.clone();
        next.tags.remove(&tag);
        next
    }

    /// Copy with the search term replaced; blank terms clear it.
    #[must_use]
    pub fn with_search(&self, term: Option<String>) -> Self {
        Self {
            search_term: non_empty(term),
            ..self.clone()
        }
    }

    /// Tags joined by commas in ascending order, or `None` when there are none.
    #[must_use]
    pub fn tags_param(&self) -> Option<String> {
        if self.tags.is_empty() {
            return None;
        }
        Some(
            self.tags
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Whether no filter is set at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connection_kind.is_none()
            && self.date.is_none()
            && self.tags.is_empty()
            && self.search_term.is_none()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_kind_round_trips_lowercase_names() {
        assert_eq!(ConnectionKind::Grpc.to_string(), "grpc");
        assert_eq!(ConnectionKind::parse("MQTT").unwrap(), ConnectionKind::Mqtt);
        assert_eq!(
            ConnectionKind::parse(" websocket ").unwrap(),
            ConnectionKind::Websocket
        );
        assert_eq!(
            ConnectionKind::all(),
            vec![
                ConnectionKind::Websocket,
                ConnectionKind::Http,
                ConnectionKind::Grpc,
                ConnectionKind::Tcp,
                ConnectionKind::Redis,
                ConnectionKind::Mqtt,
            ]
        );
    }

    #[test]
    fn connection_kind_rejects_unknown_names() {
        let err = ConnectionKind::parse("carrier-pigeon").unwrap_err();
        assert!(matches!(err, TailError::UnknownConnectionKind { value } if value == "carrier-pigeon"));
    }

    #[test]
    fn tags_stay_unique_and_sorted() {
        let criteria = FilterCriteria::default()
            .with_tag(9)
            .with_tag(-3)
            .with_tag(5)
            .with_tag(5);

        assert_eq!(criteria.tags.iter().copied().collect::<Vec<_>>(), vec![-3, 5, 9]);
        assert_eq!(criteria.tags_param().as_deref(), Some("-3,5,9"));
        assert_eq!(criteria.without_tag(5).tags_param().as_deref(), Some("-3,9"));
        assert_eq!(FilterCriteria::default().tags_param(), None);
    }

    #[test]
    fn edits_leave_the_original_untouched() {
        let original = FilterCriteria::default();
        let edited = original
            .with_connection_kind(Some(ConnectionKind::Http))
            .with_search(Some("timeout".into()));

        assert!(original.is_empty());
        assert_eq!(edited.connection_kind, Some(ConnectionKind::Http));
        assert_eq!(edited.search_term.as_deref(), Some("timeout"));
    }

    #[test]
    fn empty_strings_normalize_to_none() {
        let criteria = FilterCriteria::default()
            .with_date(Some(String::new()))
            .with_search(Some(String::new()));
        assert!(criteria.is_empty());
    }
}
