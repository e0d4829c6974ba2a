//! Time-ordered container for pending work items.
//!
//! A binary min-heap keyed by execution time. Only the queue worker touches
//! it, so it carries no synchronization of its own.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::item::WorkItem;

/// Heap entry ordered so that [`BinaryHeap`] (a max-heap) yields the
/// earliest execution time first.
struct Entry(WorkItem);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.execution_time() == other.0.execution_time()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.execution_time().cmp(&self.0.execution_time())
    }
}

/// Min-heap of [`WorkItem`]s by execution time.
///
/// Ties between equal execution times come out in no particular order.
#[derive(Default)]
pub struct TimeHeap {
    heap: BinaryHeap<Entry>,
}

impl TimeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. O(log n).
    pub fn push(&mut self, item: WorkItem) {
        self.heap.push(Entry(item));
    }

    /// The item with the earliest execution time. O(1).
    pub fn peek(&self) -> Option<&WorkItem> {
        self.heap.peek().map(|entry| &entry.0)
    }

    /// Execution time of the earliest item.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.peek().map(WorkItem::execution_time)
    }

    /// Remove and return the earliest item. O(log n).
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.heap.pop().map(|entry| entry.0)
    }

    /// Pop the whole due prefix: every item with `execution_time <= now`,
    /// earliest first. Items that are not yet due stay put.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<WorkItem> {
        let mut due = Vec::new();
        while self.peek().is_some_and(|item| item.is_due(now)) {
            if let Some(item) = self.pop() {
                due.push(item);
            }
        }
        due
    }

    /// Pop every item regardless of execution time, earliest first.
    pub fn pop_all(&mut self) -> Vec<WorkItem> {
        let mut all = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            all.push(item);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
