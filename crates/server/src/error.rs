//! Listener error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("bad scheduled call arguments: {0}")]
    BadArgs(String),

    #[error("url must be absolute http(s): {0}")]
    BadUrl(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::UnknownAction(_) | Self::BadArgs(_) | Self::BadUrl(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
