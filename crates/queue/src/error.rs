//! Queue error types.

use delayq_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid queue config: {0}")]
    Config(#[from] CoreError),

    #[error("queue worker already started")]
    AlreadyStarted,

    #[error("queue drain already in progress")]
    DrainInProgress,

    #[error("queue already drained")]
    AlreadyDrained,

    #[error("queue worker failed: {0}")]
    WorkerJoin(String),
}
