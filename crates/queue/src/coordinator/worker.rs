use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::heap::TimeHeap;
use crate::item::WorkItem;
use crate::stats::QueueCounters;
use crate::timer::DeadlineTimer;

/// Outcome of the final flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items executed by the drain, in execution-time order.
    pub executed: usize,
    /// How many of those were still sitting in the inbox when the loop stopped.
    pub from_inbox: usize,
}

/// Sole owner of the heap and the timer.
///
/// Producers only ever reach it through the inbox, so none of this state is
/// shared. `armed_deadline` always equals the heap minimum, or is `None` when
/// the heap is empty.
pub(crate) struct QueueWorker {
    heap: TimeHeap,
    timer: DeadlineTimer,
    armed_deadline: Option<DateTime<Utc>>,
    inbox: mpsc::Receiver<WorkItem>,
    shutdown: CancellationToken,
    counters: Arc<QueueCounters>,
}

impl QueueWorker {
    pub(crate) fn new(
        inbox: mpsc::Receiver<WorkItem>,
        shutdown: CancellationToken,
        counters: Arc<QueueCounters>,
        timer: DeadlineTimer,
    ) -> Self {
        Self {
            heap: TimeHeap::new(),
            timer,
            armed_deadline: None,
            inbox,
            shutdown,
            counters,
        }
    }

    /// Run the event loop until shutdown, then hand the worker back so the
    /// caller can drain what is left.
    pub(crate) async fn run(mut self) -> Self {
        info!("queue worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    break;
                }
                now = self.timer.fired() => {
                    self.dispatch_due(now);
                }
                received = self.inbox.recv() => match received {
                    Some(item) => self.accept(item),
                    None => {
                        debug!("inbox closed, stopping worker");
                        break;
                    }
                },
            }
        }
        info!(scheduled = self.heap.len(), "queue worker stopped");
        self
    }

    /// Insert an item, pulling the timer forward if it is now the earliest.
    pub(crate) fn accept(&mut self, item: WorkItem) {
        let execution_time = item.execution_time();
        debug!(item_id = %item.id(), %execution_time, "scheduled");
        self.heap.push(item);
        self.counters.set_scheduled(self.heap.len());

        let earlier = self
            .armed_deadline
            .map_or(true, |armed| execution_time < armed);
        if earlier {
            self.rearm(execution_time);
        }
    }

    /// Move the timer to `deadline`. If the old deadline already elapsed and
    /// its fire is still unconsumed, the reset absorbs it; the items it would
    /// have released are due at the new, earlier deadline anyway.
    fn rearm(&mut self, deadline: DateTime<Utc>) {
        if self.armed_deadline.is_some() {
            self.timer.stop();
        }
        if self.timer.reset(deadline) {
            debug!("absorbed pending timer fire while rearming");
        }
        self.armed_deadline = Some(deadline);
    }

    /// Pop every item due at `now` and run each on its own task without
    /// waiting for it. Returns how many were dispatched.
    pub(crate) fn dispatch_due(&mut self, now: DateTime<Utc>) -> usize {
        let due = self.heap.pop_due(now);
        let count = due.len();

        for item in due {
            let item_id = item.id();
            let lateness_ms = (now - item.execution_time()).num_milliseconds();
            debug!(item_id = %item_id, lateness_ms, "dispatching");
            tokio::spawn(item.run());
        }

        if count > 0 {
            self.counters.record_dispatched(count);
        }
        self.counters.set_scheduled(self.heap.len());

        match self.heap.next_deadline() {
            Some(next) => {
                self.timer.reset(next);
                self.armed_deadline = Some(next);
            }
            None => {
                self.timer.stop();
                self.armed_deadline = None;
            }
        }
        count
    }

    /// Final flush. Closes the inbox, folds whatever was still buffered into
    /// the heap, then runs every item in execution-time order, one at a time,
    /// ignoring due time.
    pub(crate) async fn drain(mut self) -> DrainReport {
        self.inbox.close();
        let mut from_inbox = 0;
        // recv() only yields None once every in-flight send has landed.
        while let Some(item) = self.inbox.recv().await {
            self.heap.push(item);
            from_inbox += 1;
        }

        if !self.timer.stop() {
            self.timer.acknowledge();
        }
        self.armed_deadline = None;

        let items = self.heap.pop_all();
        self.counters.set_scheduled(0);
        let executed = items.len();
        info!(executed, from_inbox, "draining queue");

        for item in items {
            debug!(item_id = %item.id(), "draining");
            item.run().await;
        }
        self.counters.record_drained(executed);

        DrainReport {
            executed,
            from_inbox,
        }
    }

    #[cfg(test)]
    pub(crate) fn armed_deadline(&self) -> Option<DateTime<Utc>> {
        self.armed_deadline
    }

    #[cfg(test)]
    pub(crate) fn timer(&self) -> &DeadlineTimer {
        &self.timer
    }

    #[cfg(test)]
    pub(crate) fn scheduled(&self) -> usize {
        self.heap.len()
    }
}
