//! # Deferred Reconnect
//!
//! Holds at most one pending "connect with these criteria at time T" action.
//! Scheduling replaces whatever was pending; the owner polls it against the
//! clock and cancels it on disconnect.

use std::time::Duration;

use tokio::time::Instant;

use crate::models::FilterCriteria;

/// Longest delay a reconnect can be deferred by.
pub const MAX_DEFER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct Pending {
    ticket: u64,
    due: Instant,
    criteria: FilterCriteria,
}

/// Single-slot debounce for reconnects.
#[derive(Debug, Default)]
pub struct DeferredConnect {
    next_ticket: u64,
    pending: Option<Pending>,
}

impl DeferredConnect {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a connect `delay` after `now`, replacing any pending one.
    ///
    /// Delays are capped at [`MAX_DEFER`]. Returns the ticket identifying
    /// this action.
    pub fn schedule(&mut self, criteria: FilterCriteria, delay: Duration, now: Instant) -> u64 {
        self.next_ticket += 1;
        let due = now.checked_add(delay.min(MAX_DEFER)).unwrap_or(now);
        self.pending = Some(Pending {
            ticket: self.next_ticket,
            due,
            criteria,
        });
        self.next_ticket
    }

    /// Drops the pending action; returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Whether an action is waiting.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Ticket of the pending action.
    #[must_use]
    pub fn ticket(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.ticket)
    }

    /// When the pending action becomes due.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Criteria the pending action will connect with.
    #[must_use]
    pub fn criteria(&self) -> Option<&FilterCriteria> {
        self.pending.as_ref().map(|p| &p.criteria)
    }

    /// Takes the pending criteria if the action is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<FilterCriteria> {
        if self.pending.as_ref().is_some_and(|p| p.due <= now) {
            self.pending.take().map(|p| p.criteria)
        } else {
            None
        }
    }
}
