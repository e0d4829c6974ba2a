use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use delayq_queue::{Lifecycle, QueueStats};

use crate::error::ApiError;
use crate::executable::{Action, CallSpec};
use crate::state::AppState;

// ── Schedule ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub action: String,
    pub url: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Seconds from now. Zero or negative runs on the next timer pass.
    #[serde(default)]
    pub delay: i64,
}

impl ScheduleRequest {
    fn execution_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_seconds(self.delay)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(if self.delay < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }
}

fn check_url(raw: &str) -> Result<(), ApiError> {
    match reqwest::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ApiError::BadUrl(raw.to_string())),
    }
}

/// Accept a call to be made `delay` seconds from now.
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> Result<&'static str, ApiError> {
    let action = Action::parse(&req.action)?;
    check_url(&req.url)?;

    let execution_time = req.execution_time(Utc::now());
    let call = CallSpec {
        action,
        url: req.url,
        payload: req.payload,
    };
    debug!(action = action.as_str(), url = %call.url, delay = req.delay, "schedule request");

    let accepted = state
        .queue
        .enqueue(execution_time, state.http_call.clone(), call.into_args())
        .await;
    if !accepted {
        info!("refusing schedule request during shutdown");
        return Err(ApiError::ShuttingDown);
    }
    Ok("accepted")
}

// ── Health ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub lifecycle: Lifecycle,
    pub stats: QueueStats,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let lifecycle = state.queue.lifecycle();
    let status = match lifecycle {
        Lifecycle::Created | Lifecycle::Running => "ok",
        Lifecycle::Stopped | Lifecycle::Drained => "shutting_down",
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        lifecycle,
        stats: state.queue.stats(),
    })
}
