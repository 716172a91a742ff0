//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error returned by handlers. Rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// A dependency (broker, store) could not serve the request.
    Unavailable(String),
    Internal(String),
}

impl From<newsfeat_core::Error> for ApiError {
    fn from(err: newsfeat_core::Error) -> Self {
        use newsfeat_core::FailureKind;

        match err.kind() {
            FailureKind::NotFound => ApiError::NotFound(err.to_string()),
            FailureKind::Validation => ApiError::BadRequest(err.to_string()),
            FailureKind::Connection => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => {
                error!(subsystem = "api", error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
