//! Error types for digger-analyzer

use crate::recording::{CaptureError, RecordingError};
use crate::session::SessionError;
use crate::state::SongStateError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Microphone access refused (403)
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// No capture device (503)
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Conflict (409), e.g. capture already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Recording(RecordingError::Capture(CaptureError::PermissionDenied)) => {
                ApiError::PermissionDenied
            }
            SessionError::Recording(RecordingError::Capture(CaptureError::DeviceUnavailable(
                reason,
            ))) => ApiError::DeviceUnavailable(reason),
            SessionError::Recording(e @ RecordingError::NotIdle(_)) => {
                ApiError::Conflict(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SongStateError> for ApiError {
    fn from(err: SongStateError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "PERMISSION_DENIED",
                "Microphone permission denied".to_string(),
            ),
            ApiError::DeviceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DEVICE_UNAVAILABLE",
                msg,
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
