use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use delayq_core::QueueConfig;

use crate::error::QueueError;
use crate::item::{Executable, WorkItem};
use crate::stats::{QueueCounters, QueueStats};
use crate::timer::DeadlineTimer;

use super::worker::{DrainReport, QueueWorker};

/// Externally visible lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Created,
    Running,
    Stopped,
    Drained,
}

/// Who currently owns the worker.
pub(super) enum Phase {
    Created(QueueWorker),
    Running(JoinHandle<QueueWorker>),
    Draining,
    Drained,
}

/// Delayed-task queue.
///
/// Any number of producers call [`enqueue`](Self::enqueue); a single worker
/// task, started with [`start`](Self::start), owns the time-ordered heap and
/// the timer and dispatches each item once it comes due. Shutdown is two
/// steps folded into [`drain`](Self::drain): stop the worker, then run
/// everything still pending.
pub struct SchedulingQueue {
    pub(super) sender: mpsc::Sender<WorkItem>,
    pub(super) shutdown: CancellationToken,
    pub(super) phase: Mutex<Phase>,
    pub(super) counters: Arc<QueueCounters>,
}

impl SchedulingQueue {
    /// Create a queue in the `Created` stage. Nothing is dispatched until
    /// [`start`](Self::start) is called.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    /// Queue with the default inbox capacity and idle timeout.
    pub fn with_defaults() -> Self {
        Self::build(&QueueConfig::default())
    }

    fn build(config: &QueueConfig) -> Self {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity);
        let shutdown = CancellationToken::new();
        let counters = Arc::new(QueueCounters::default());
        let worker = QueueWorker::new(
            inbox,
            shutdown.clone(),
            Arc::clone(&counters),
            DeadlineTimer::new(config.idle_timeout),
        );
        Self {
            sender,
            shutdown,
            phase: Mutex::new(Phase::Created(worker)),
            counters,
        }
    }

    /// Schedule `executable(args)` to run at `execution_time`.
    ///
    /// Waits while the inbox is full. Returns `false` without touching any
    /// state once shutdown has been signalled, including when the signal
    /// arrives while this call is waiting for room.
    pub async fn enqueue(
        &self,
        execution_time: DateTime<Utc>,
        executable: Arc<dyn Executable>,
        args: Vec<Value>,
    ) -> bool {
        if self.shutdown.is_cancelled() {
            self.counters.record_rejected();
            return false;
        }

        let item = WorkItem::new(execution_time, executable, args);
        let item_id = item.id();
        let accepted = tokio::select! {
            _ = self.shutdown.cancelled() => false,
            sent = self.sender.send(item) => sent.is_ok(),
        };

        if accepted {
            self.counters.record_accepted();
            debug!(item_id = %item_id, %execution_time, "enqueued");
        } else {
            self.counters.record_rejected();
            debug!(item_id = %item_id, "enqueue rejected, queue is shutting down");
        }
        accepted
    }

    /// [`enqueue`](Self::enqueue) at `now + delay`.
    pub async fn enqueue_after(
        &self,
        delay: Duration,
        executable: Arc<dyn Executable>,
        args: Vec<Value>,
    ) -> bool {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let execution_time = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.enqueue(execution_time, executable, args).await
    }

    /// Enqueue from a plain thread outside the async runtime.
    ///
    /// Must not be called from within an async context. If the inbox is full
    /// when shutdown is signalled, this waits until drain closes the inbox and
    /// then returns `false`.
    pub fn blocking_enqueue(
        &self,
        execution_time: DateTime<Utc>,
        executable: Arc<dyn Executable>,
        args: Vec<Value>,
    ) -> bool {
        if self.shutdown.is_cancelled() {
            self.counters.record_rejected();
            return false;
        }
        let item = WorkItem::new(execution_time, executable, args);
        let accepted = self.sender.blocking_send(item).is_ok();
        if accepted {
            self.counters.record_accepted();
        } else {
            self.counters.record_rejected();
        }
        accepted
    }

    /// Spawn the worker loop on the current tokio runtime. Must be called
    /// exactly once, from within a runtime.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut phase = self.lock_phase();
        match &*phase {
            Phase::Created(_) => {}
            Phase::Running(_) | Phase::Draining => return Err(QueueError::AlreadyStarted),
            Phase::Drained => return Err(QueueError::AlreadyDrained),
        }
        if let Phase::Created(worker) = std::mem::replace(&mut *phase, Phase::Draining) {
            *phase = Phase::Running(tokio::spawn(worker.run()));
            info!("scheduling queue started");
        }
        Ok(())
    }

    /// Signal shutdown. The worker exits on its next wake-up and every later
    /// enqueue is refused. Pending items stay put until [`drain`](Self::drain).
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("scheduling queue shutdown requested");
        }
        self.shutdown.cancel();
    }

    /// Stop accepting work, wait for the worker to exit, then run every item
    /// still pending (heap and inbox) in execution-time order, ignoring due
    /// time. Each item runs to completion before the next starts.
    ///
    /// Items the worker already dispatched are not run again. Every enqueue
    /// that returned `true` is executed exactly once, either by the worker or
    /// here.
    pub async fn drain(&self) -> Result<DrainReport, QueueError> {
        self.shutdown();

        let phase = std::mem::replace(&mut *self.lock_phase(), Phase::Draining);
        let worker = match phase {
            Phase::Created(worker) => worker,
            Phase::Running(handle) => match handle.await {
                Ok(worker) => worker,
                Err(e) => {
                    warn!(error = %e, "queue worker did not exit cleanly");
                    *self.lock_phase() = Phase::Drained;
                    return Err(QueueError::WorkerJoin(e.to_string()));
                }
            },
            Phase::Draining => return Err(QueueError::DrainInProgress),
            Phase::Drained => {
                *self.lock_phase() = Phase::Drained;
                return Err(QueueError::AlreadyDrained);
            }
        };

        let report = worker.drain().await;
        *self.lock_phase() = Phase::Drained;
        info!(executed = report.executed, "scheduling queue drained");
        Ok(report)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let cancelled = self.shutdown.is_cancelled();
        match &*self.lock_phase() {
            Phase::Drained => Lifecycle::Drained,
            Phase::Draining => Lifecycle::Stopped,
            _ if cancelled => Lifecycle::Stopped,
            Phase::Created(_) => Lifecycle::Created,
            Phase::Running(_) => Lifecycle::Running,
        }
    }

    /// Token that fires when shutdown is signalled. Cancelling it has the same
    /// effect as [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SchedulingQueue {
    fn default() -> Self {
        Self::with_defaults()
    }
}
