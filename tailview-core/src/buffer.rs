//! # Message Buffer
//!
//! Bounded, arrival-ordered window of accepted events with FIFO eviction.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::{error::TailResult, models::StreamEvent};

/// Default capacity when none is configured.
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

/// Rendering switches shared by console output and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Prefix each line with the arrival time
    pub show_timestamps: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_timestamps: true,
        }
    }
}

/// Rolling window of the most recent events.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    entries: VecDeque<StreamEvent>,
    max_messages: usize,
    evicted: u64,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

impl MessageBuffer {
    /// Creates an empty buffer; a capacity of zero is raised to one.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            entries: VecDeque::with_capacity(max_messages.min(DEFAULT_MAX_MESSAGES)),
            max_messages,
            evicted: 0,
        }
    }

    /// Appends at the tail, evicting from the head until the buffer fits.
    ///
    /// Returns how many entries were evicted.
    pub fn append(&mut self, event: StreamEvent) -> usize {
        self.entries.push_back(event);

        let mut dropped = 0;
        while self.entries.len() > self.max_messages {
            self.entries.pop_front();
            dropped += 1;
        }

        if dropped > 0 {
            self.evicted += dropped as u64;
            counter!("tailview_messages_evicted_total").increment(dropped as u64);
        }
        dropped
    }

    /// Drops every entry. The eviction total is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity.
    #[must_use]
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Total entries evicted over the buffer's lifetime.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &StreamEvent> {
        self.entries.iter()
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StreamEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Flattens the buffer into text, one line per event, joined by `\n`.
    #[must_use]
    pub fn export(&self, options: &DisplayOptions) -> String {
        self.entries
            .iter()
            .map(|event| event.to_line(options))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// File name for an export taken at `now`: `sse-messages-<ISO 8601 to the second>.txt`.
#[must_use]
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("sse-messages-{}.txt", now.format("%Y-%m-%dT%H:%M:%S"))
}

/// Writes `contents` into `dir` under [`export_file_name`] and returns the path.
///
/// # Errors
/// Returns an error if the directory cannot be created or the file cannot be written.
pub fn write_export(dir: &Path, contents: &str, now: DateTime<Utc>) -> TailResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    fs::write(&path, contents)?;
    Ok(path)
}
