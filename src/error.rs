//! Centralized error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type.
///
/// Body parser rejections, route registration failures and handler errors
/// are all converted to this type so every response has the same shape.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad request error (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body exceeds the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unsupported charset or content encoding (415)
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Route registration failed while building the application
    #[error("Route registration failed: {0}")]
    Registration(String),

    /// JSON syntax error in a request body
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure on the listener or while reading a body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            Self::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Registration(msg) => {
                tracing::error!("Route registration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Application is not available".to_string(),
                )
            }
            Self::Json(e) => {
                tracing::debug!("JSON error: {e:?}");
                (StatusCode::BAD_REQUEST, format!("JSON error: {e}"))
            }
            Self::Io(e) => {
                tracing::error!("I/O error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "I/O error occurred".to_string(),
                )
            }
        };

        // Report error to Sentry for server errors
        if status.is_server_error() {
            sentry::capture_error(&self);
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;
