//! Error types for the newsfeat pipeline.

use thiserror::Error;

/// Result type alias using newsfeat's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure, independent of where it was raised.
///
/// Callers branch on the kind instead of matching individual error variants.
/// The queue layer never looks at it (it only sees a boolean outcome); the
/// orchestrator and the enrichment client use it to pick retry behaviour and
/// log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Broker or store unreachable.
    Connection,
    /// Credential rejected by the enrichment API.
    Authentication,
    /// Schema, range, or enum violation in a payload. Permanent data defect.
    Validation,
    /// Timeout, 5xx, or rate-limit rejection from the enrichment API.
    TransientApi,
    /// Non-success API status that retrying cannot fix (4xx other than auth/429).
    RejectedApi,
    /// Queue message body that cannot be decoded.
    UnrecoverableMessage,
    /// Referenced entity does not exist (yet).
    NotFound,
    /// Missing or invalid configuration.
    Configuration,
    /// Anything else.
    Internal,
}

impl FailureKind {
    /// Terminal failures are never retried, whatever the remaining budget.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authentication
                | Self::Validation
                | Self::RejectedApi
                | Self::UnrecoverableMessage
                | Self::Configuration
        )
    }

    /// Short label used in structured log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Authentication => "authentication",
            Self::Validation => "validation",
            Self::TransientApi => "transient_api",
            Self::RejectedApi => "rejected_api",
            Self::UnrecoverableMessage => "unrecoverable_message",
            Self::NotFound => "not_found",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

/// Core error type for newsfeat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Broker, store, or HTTP transport could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request to the enrichment API timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Enrichment API rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Enrichment API rejected the request rate
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Enrichment API returned a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Enrichment response could not be parsed as JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Enrichment response violated the output contract
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue message body could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Queue topology or consumer failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Message could not be published
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed for a reason other than connect/timeout
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Database(sqlx::Error::Database(db)) if is_constraint_violation(db.kind()) => {
                FailureKind::Validation
            }
            Error::Database(_) | Error::Connection(_) | Error::Queue(_) | Error::Publish(_) => {
                FailureKind::Connection
            }
            Error::NotFound(_) => FailureKind::NotFound,
            Error::Timeout(_) | Error::RateLimited(_) | Error::Request(_) => {
                FailureKind::TransientApi
            }
            Error::Api { status, .. } if *status >= 500 => FailureKind::TransientApi,
            Error::Api { .. } => FailureKind::RejectedApi,
            Error::Authentication(_) => FailureKind::Authentication,
            Error::Parse(_) | Error::Validation(_) | Error::Serialization(_) => {
                FailureKind::Validation
            }
            Error::MalformedMessage(_) => FailureKind::UnrecoverableMessage,
            Error::Config(_) => FailureKind::Configuration,
            Error::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        !self.kind().is_terminal()
    }
}

/// A row the database refused to accept. Retrying the same write cannot help.
fn is_constraint_violation(kind: sqlx::error::ErrorKind) -> bool {
    use sqlx::error::ErrorKind;
    matches!(
        kind,
        ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation
    )
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::Connection(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::fmt;

    /// Server-side error with a chosen constraint kind.
    #[derive(Debug)]
    struct Rejected(ErrorKind);

    impl fmt::Display for Rejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "constraint rejected the row")
        }
    }

    impl std::error::Error for Rejected {}

    impl DatabaseError for Rejected {
        fn message(&self) -> &str {
            "constraint rejected the row"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                ErrorKind::NotNullViolation => ErrorKind::NotNullViolation,
                ErrorKind::CheckViolation => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn db_error(kind: ErrorKind) -> Error {
        Error::Database(sqlx::Error::Database(Box::new(Rejected(kind))))
    }

    #[test]
    fn test_constraint_violations_are_terminal() {
        for kind in [
            ErrorKind::UniqueViolation,
            ErrorKind::ForeignKeyViolation,
            ErrorKind::NotNullViolation,
            ErrorKind::CheckViolation,
        ] {
            let err = db_error(kind);
            assert_eq!(err.kind(), FailureKind::Validation);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_other_database_errors_stay_retryable() {
        let err = db_error(ErrorKind::Other);
        assert_eq!(err.kind(), FailureKind::Connection);
        assert!(err.is_retryable());

        let err = Error::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), FailureKind::Connection);
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("article 7".to_string());
        assert_eq!(err.to_string(), "Not found: article 7");
    }

    #[test]
    fn test_error_display_api() {
        let err = Error::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "API error 502: bad gateway");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing XAI_API_KEY".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing XAI_API_KEY");
    }

    #[test]
    fn test_kind_authentication_is_terminal() {
        let err = Error::Authentication("invalid key".into());
        assert_eq!(err.kind(), FailureKind::Authentication);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_validation_is_terminal() {
        assert!(!Error::Validation("alt_kategori".into()).is_retryable());
        assert!(!Error::Parse("not json".into()).is_retryable());
    }

    #[test]
    fn test_kind_server_error_is_retryable() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.kind(), FailureKind::TransientApi);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_kind_client_error_is_terminal() {
        let err = Error::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert_eq!(err.kind(), FailureKind::RejectedApi);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_timeout_and_rate_limit_are_transient() {
        assert_eq!(
            Error::Timeout("30s".into()).kind(),
            FailureKind::TransientApi
        );
        assert_eq!(
            Error::RateLimited("slow down".into()).kind(),
            FailureKind::TransientApi
        );
    }

    #[test]
    fn test_kind_connection_family() {
        assert_eq!(
            Error::Connection("refused".into()).kind(),
            FailureKind::Connection
        );
        assert_eq!(Error::Publish("closed".into()).kind(), FailureKind::Connection);
        assert_eq!(
            Error::Database(sqlx::Error::PoolTimedOut).kind(),
            FailureKind::Connection
        );
    }

    #[test]
    fn test_kind_malformed_message() {
        let err = Error::MalformedMessage("expected value".into());
        assert_eq!(err.kind(), FailureKind::UnrecoverableMessage);
        assert!(err.kind().is_terminal());
    }

    #[test]
    fn test_not_found_is_retryable() {
        assert!(Error::NotFound("article 123".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(FailureKind::TransientApi.as_str(), "transient_api");
        assert_eq!(
            FailureKind::UnrecoverableMessage.as_str(),
            "unrecoverable_message"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
