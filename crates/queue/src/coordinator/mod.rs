//! Queue coordinator -- the single-writer event loop around the heap.
//!
//! Split into focused submodules:
//! - `core`: `SchedulingQueue`, its lifecycle, and the producer-facing enqueue
//! - `worker`: the event loop that owns the heap and timer, plus the final drain

mod core;
mod worker;

pub use self::core::{Lifecycle, SchedulingQueue};
pub use self::worker::DrainReport;
