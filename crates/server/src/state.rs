use std::sync::Arc;

use delayq_queue::{Executable, SchedulingQueue};

use crate::executable::HttpCall;

/// Shared handler state.
pub struct AppState {
    pub queue: Arc<SchedulingQueue>,
    /// One executable (and one HTTP client) shared by every scheduled call.
    pub http_call: Arc<dyn Executable>,
}

impl AppState {
    pub fn new(queue: Arc<SchedulingQueue>) -> Self {
        Self::with_executable(queue, Arc::new(HttpCall::new()))
    }

    pub fn with_executable(queue: Arc<SchedulingQueue>, http_call: Arc<dyn Executable>) -> Self {
        Self { queue, http_call }
    }
}
