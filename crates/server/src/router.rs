//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api;
use crate::state::AppState;

/// Build the listener router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(api::schedule))
        .route("/health", get(api::health))
        .with_state(state)
}
