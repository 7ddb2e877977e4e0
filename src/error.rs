use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::parcel::ParcelStatus;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ParcelStatus, to: ParcelStatus },

    /// Lost a per-parcel race. Retry with fresh state.
    #[error("concurrent modification of parcel {0}")]
    ConcurrentModification(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("address resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// Never surfaced to callers of the state machine; logged by the notification worker.
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidCoordinates(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. }
            | AppError::ConcurrentModification(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ResolverUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotificationFailed(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
