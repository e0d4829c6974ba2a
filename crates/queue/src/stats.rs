//! Queue counters, updated lock-free and read as a snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Live counters shared between producers, the worker and drain.
#[derive(Debug, Default)]
pub struct QueueCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    drained: AtomicU64,
    scheduled: AtomicUsize,
}

impl QueueCounters {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self, count: usize) {
        self.dispatched.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Number of items currently held in the heap.
    pub(crate) fn set_scheduled(&self, len: usize) {
        self.scheduled.store(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueStats {
        QueueStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`QueueCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Enqueues that made it into the inbox.
    pub accepted: u64,
    /// Enqueues refused because the queue was shutting down.
    pub rejected: u64,
    /// Items handed to their own task by the worker loop.
    pub dispatched: u64,
    /// Items run by the final drain.
    pub drained: u64,
    /// Items waiting in the heap (does not include the inbox).
    pub scheduled: usize,
}
