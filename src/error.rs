use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// The admission gates themselves never surface these to clients: a token
/// failure becomes a redirect and a rate store failure becomes an allow.
/// These errors belong to configuration loading and the downstream handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            // Server-side failures: log details, expose a generic message
            AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "config_error",
                    "Service configuration error. Please contact support.",
                )
            }

            // Client errors are expected traffic, not worth an error log
            AppError::Unauthorized(msg) => {
                tracing::debug!(error = %self, "Unauthorized request");
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.as_str())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
