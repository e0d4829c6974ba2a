//! In-process delayed-task dispatcher.
//!
//! Producers hand [`WorkItem`]s to a [`SchedulingQueue`] through a bounded
//! inbox. One worker task owns the time-ordered heap and a single deadline
//! timer armed at the earliest pending item; when it fires, every due item is
//! dispatched on its own task. On shutdown, [`SchedulingQueue::drain`] runs
//! whatever is left.

pub mod coordinator;
pub mod error;
pub mod heap;
pub mod item;
pub mod stats;
pub mod timer;

pub use coordinator::{DrainReport, Lifecycle, SchedulingQueue};
pub use error::QueueError;
pub use heap::TimeHeap;
pub use item::{Executable, WorkItem};
pub use stats::{QueueCounters, QueueStats};
pub use timer::{DeadlineTimer, TimerState};
