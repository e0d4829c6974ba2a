//! Work items and the executable seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Something the queue can run once its work item comes due.
///
/// The queue never observes the outcome: failures are the implementor's
/// concern, and nothing is retried.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, args: Vec<Value>);
}

#[async_trait]
impl<F> Executable for F
where
    F: Fn(Vec<Value>) + Send + Sync,
{
    async fn execute(&self, args: Vec<Value>) {
        (self)(args)
    }
}

/// An executable, its arguments, and the time it should run at.
///
/// Immutable once built. The heap owns it until it is popped; after that it is
/// moved into whichever task runs it.
pub struct WorkItem {
    id: Uuid,
    execution_time: DateTime<Utc>,
    executable: Arc<dyn Executable>,
    args: Vec<Value>,
}

impl WorkItem {
    pub fn new(
        execution_time: DateTime<Utc>,
        executable: Arc<dyn Executable>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_time,
            executable,
            args,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn execution_time(&self) -> DateTime<Utc> {
        self.execution_time
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Whether the item should have run by `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execution_time <= now
    }

    /// Consume the item and run its executable with the stored arguments.
    pub async fn run(self) {
        self.executable.execute(self.args).await;
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("execution_time", &self.execution_time)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
