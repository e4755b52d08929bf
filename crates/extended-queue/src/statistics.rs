//! Per-queue processing counters.
//!
//! Each `ExtendedQueue` owns one `QueueStatistics` behind an `Arc`. Counters
//! are updated atomically from the processing tasks and read through
//! `snapshot()`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
#[path = "statistics_tests.rs"]
mod tests;

/// Live counters for one queue instance
#[derive(Debug, Default)]
pub struct QueueStatistics {
    critically_faulted: AtomicU64,
    reenqueues: AtomicU64,
    handled: AtomicU64,
    poison: AtomicU64,
    stale: AtomicU64,
}

impl QueueStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processing failure that leaves the message for redelivery
    pub fn record_failure(&self) {
        self.critically_faulted.fetch_add(1, Ordering::Relaxed);
        self.reenqueues.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message acknowledged by its handler
    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poison(&self) {
        self.poison.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn critically_faulted(&self) -> u64 {
        self.critically_faulted.load(Ordering::Relaxed)
    }

    pub fn reenqueues(&self) -> u64 {
        self.reenqueues.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            critically_faulted: self.critically_faulted(),
            reenqueues: self.reenqueues(),
            handled: self.handled.load(Ordering::Relaxed),
            poison: self.poison.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Failures routed through the exception path
    pub critically_faulted: u64,
    /// Messages left on the queue for redelivery after a failure
    pub reenqueues: u64,
    /// Messages acknowledged by a handler
    pub handled: u64,
    /// Messages that crossed the poison threshold
    pub poison: u64,
    /// Messages discarded for being older than the time window
    pub stale: u64,
}

impl std::fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "handled={} poison={} stale={} critically_faulted={} reenqueues={}",
            self.handled, self.poison, self.stale, self.critically_faulted, self.reenqueues
        )
    }
}
