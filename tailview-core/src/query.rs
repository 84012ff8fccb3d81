//! # Query Builder
//!
//! Holds the current filter criteria and turns user edits into new criteria
//! plus the debounce to reconnect with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    dates::DateCatalog,
    error::{TailError, TailResult},
    models::{ConnectionKind, FilterCriteria},
};

/// Debounce applied before reconnecting after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceDelays {
    /// Connection kind, date and tag edits.
    pub selector: Duration,
    /// Free-text search edits.
    pub search: Duration,
}

impl Default for DebounceDelays {
    fn default() -> Self {
        Self {
            selector: Duration::from_millis(100),
            search: Duration::from_millis(500),
        }
    }
}

/// An edit that actually changed the criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaEdit {
    /// Criteria after the edit
    pub criteria: FilterCriteria,
    /// How long to wait before reconnecting with them
    pub debounce: Duration,
}

/// Holds the current filter and reports which edits change it.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    criteria: FilterCriteria,
    dates: DateCatalog,
    delays: DebounceDelays,
}

impl QueryBuilder {
    /// Empty filter validated against `dates`.
    #[must_use]
    pub fn new(dates: DateCatalog, delays: DebounceDelays) -> Self {
        Self {
            criteria: FilterCriteria::default(),
            dates,
            delays,
        }
    }

    /// Starts from `criteria` instead of an empty filter.
    #[must_use]
    pub fn with_criteria(mut self, criteria: FilterCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Current filter.
    #[must_use]
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Connection kinds that can be selected.
    #[must_use]
    pub fn available_connection_kinds(&self) -> Vec<ConnectionKind> {
        ConnectionKind::all()
    }

    /// Dates that can be selected.
    #[must_use]
    pub fn available_dates(&self) -> &[String] {
        self.dates.dates()
    }

    /// Selects a connection kind, or clears it with `None`.
    pub fn set_connection_kind(&mut self, kind: Option<ConnectionKind>) -> Option<CriteriaEdit> {
        let next = self.criteria.with_connection_kind(kind);
        self.commit(next, self.delays.selector)
    }

    /// Selects a date, or clears it with `None`.
    ///
    /// # Errors
    /// Returns [`TailError::UnknownDate`] when the catalog is populated and
    /// does not list `date`.
    pub fn set_date(&mut self, date: Option<String>) -> TailResult<Option<CriteriaEdit>> {
        if let Some(value) = date.as_deref().filter(|d| !d.is_empty()) {
            if !self.dates.is_empty() && !self.dates.contains(value) {
                return Err(TailError::UnknownDate {
                    value: value.to_string(),
                });
            }
        }
        let next = self.criteria.with_date(date);
        Ok(self.commit(next, self.delays.selector))
    }

    /// Selects a tag.
    pub fn add_tag(&mut self, tag: i64) -> Option<CriteriaEdit> {
        let next = self.criteria.with_tag(tag);
        self.commit(next, self.delays.selector)
    }

    /// Deselects a tag.
    pub fn remove_tag(&mut self, tag: i64) -> Option<CriteriaEdit> {
        let next = self.criteria.without_tag(tag);
        self.commit(next, self.delays.selector)
    }

    /// Replaces the search term; blank terms clear it.
    pub fn set_search(&mut self, term: Option<String>) -> Option<CriteriaEdit> {
        let next = self.criteria.with_search(term);
        self.commit(next, self.delays.search)
    }

    fn commit(&mut self, next: FilterCriteria, debounce: Duration) -> Option<CriteriaEdit> {
        if next == self.criteria {
            return None;
        }
        self.criteria = next.clone();
        Some(CriteriaEdit {
            criteria: next,
            debounce,
        })
    }
}
