//! Exchange counters shared by every bridge opened through one service.

use super::outcome::{ExchangeOutcome, FailureReason};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for exchanges
#[derive(Debug, Default)]
pub struct ExchangeStats {
    /// Exchanges whose handshake was acknowledged
    pub total_opened: AtomicU64,
    /// Exchanges whose handshake failed
    pub total_handshake_failures: AtomicU64,
    /// Exchanges that ended with response-end
    pub total_completed: AtomicU64,
    /// Active exchanges that failed (timeouts included)
    pub total_failed: AtomicU64,
    /// Failures caused by a deadline
    pub total_timeouts: AtomicU64,
    /// Exchanges currently active
    pub active: AtomicU64,
}

/// Point-in-time copy of [`ExchangeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub opened: u64,
    pub handshake_failures: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub active: u64,
}

impl ExchangeStats {
    pub(crate) fn record_opened(&self) {
        self.total_opened.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handshake_failure(&self) {
        self.total_handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, outcome: &ExchangeOutcome) {
        match outcome {
            ExchangeOutcome::Completed => {
                self.total_completed.fetch_add(1, Ordering::Relaxed);
            }
            ExchangeOutcome::Failed(reason) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                if *reason == FailureReason::Timeout {
                    self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        // Never underflows: only exchanges counted by record_opened finish.
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opened: self.total_opened.load(Ordering::Relaxed),
            handshake_failures: self.total_handshake_failures.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            failed: self.total_failed.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}
