//! Grok-specific error handling.

use newsfeat_core::Error;

/// Classification of a non-success HTTP status from the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrokErrorCode {
    /// Invalid or unauthorized API key.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Server error.
    ServerError,
    /// Any other non-success status.
    Rejected,
}

impl GrokErrorCode {
    /// Determine error code from HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationError,
            429 => Self::RateLimitExceeded,
            500..=599 => Self::ServerError,
            _ => Self::Rejected,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }

    /// Convert to the pipeline error, keeping the response body for context.
    pub fn into_error(self, status: u16, body: &str) -> Error {
        match self {
            Self::AuthenticationError => {
                Error::Authentication(format!("API key rejected ({}). Check XAI_API_KEY", status))
            }
            Self::RateLimitExceeded => {
                Error::RateLimited("Rate limit exceeded. Wait before retrying".to_string())
            }
            Self::ServerError => Error::Api {
                status,
                message: format!("Grok API server error: {}", body),
            },
            Self::Rejected => Error::Api {
                status,
                message: format!("Unexpected API response: {}", body),
            },
        }
    }
}
