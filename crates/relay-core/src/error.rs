//! Error taxonomy for the relay.
//!
//! `RelayError` carries a stable code per failure class so callers and
//! operators can disambiguate without parsing messages. Ingress errors are
//! surfaced to the sender; forwarding errors only ever reach the outcome
//! store and the logs.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Storage-level error for repository operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Relay error types with stable codes.
#[derive(Debug, Error)]
pub enum RelayError {
    // Ingress (E1001-E1006)
    /// `X-Signature` header absent or empty (E1001).
    #[error("[E1001] missing_signature")]
    MissingSignature,

    /// `X-Timestamp` header absent or empty (E1002).
    #[error("[E1002] missing_timestamp")]
    MissingTimestamp,

    /// HMAC did not match the canonical message (E1003).
    #[error("[E1003] invalid_signature")]
    InvalidSignature,

    /// Timestamp outside the accepted tolerance window (E1004).
    #[error("[E1004] timestamp_out_of_window")]
    TimestampOutOfWindow,

    /// Body failed structural validation (E1005).
    #[error("[E1005] Malformed payload: {reason}")]
    MalformedPayload {
        /// Why the body was rejected
        reason: String,
    },

    /// Body exceeds the ingest size limit (E1006).
    #[error("[E1006] Payload too large: size {size_bytes} bytes exceeds 10MB limit")]
    PayloadTooLarge {
        /// Size of the payload in bytes
        size_bytes: usize,
    },

    // Forwarding (E2001-E2004)
    /// Destination answered with a non-retryable 4xx (E2001).
    #[error("[E2001] Destination rejected request: HTTP {status}")]
    DestinationRejected {
        /// HTTP status code returned by the destination
        status: u16,
    },

    /// Destination answered 5xx or 429 (E2002).
    #[error("[E2002] Destination unavailable: HTTP {status}")]
    DestinationUnavailable {
        /// HTTP status code returned by the destination
        status: u16,
    },

    /// Connection failure or timeout reaching the destination (E2003).
    #[error("[E2003] Network failure: {message}")]
    NetworkFailure {
        /// Transport error description
        message: String,
    },

    /// Every allowed attempt failed with a retryable error (E2004).
    #[error("[E2004] Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    // System (E3001-E3002)
    /// Required configuration absent or invalid (E3001).
    #[error("[E3001] Configuration error: {message}")]
    Configuration {
        /// What is missing or wrong
        message: String,
    },

    /// Durable store failed (E3002).
    #[error("[E3002] Storage error: {0}")]
    Storage(#[from] CoreError),

    /// Generic error for wrapping other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Returns the stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingSignature => "E1001",
            Self::MissingTimestamp => "E1002",
            Self::InvalidSignature => "E1003",
            Self::TimestampOutOfWindow => "E1004",
            Self::MalformedPayload { .. } => "E1005",
            Self::PayloadTooLarge { .. } => "E1006",
            Self::DestinationRejected { .. } => "E2001",
            Self::DestinationUnavailable { .. } => "E2002",
            Self::NetworkFailure { .. } => "E2003",
            Self::RetriesExhausted { .. } => "E2004",
            Self::Configuration { .. } => "E3001",
            Self::Storage(_) => "E3002",
            Self::Other(_) => "E9999",
        }
    }

    /// Whether the error belongs to the authentication class.
    pub const fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::MissingTimestamp
                | Self::InvalidSignature
                | Self::TimestampOutOfWindow
        )
    }

    /// Returns whether this error should trigger another forwarding attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DestinationUnavailable { .. } | Self::NetworkFailure { .. })
    }

    /// Machine-readable reason surfaced to the sender on authentication
    /// failure.
    pub const fn reason(&self) -> Option<&'static str> {
        match self {
            Self::MissingSignature => Some("missing_signature"),
            Self::MissingTimestamp => Some("missing_timestamp"),
            Self::InvalidSignature => Some("invalid_signature"),
            Self::TimestampOutOfWindow => Some("timestamp_out_of_window"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(RelayError::MissingSignature.code(), "E1001");
        assert_eq!(RelayError::TimestampOutOfWindow.code(), "E1004");
        assert_eq!(RelayError::PayloadTooLarge { size_bytes: 0 }.code(), "E1006");
        assert_eq!(RelayError::RetriesExhausted { attempts: 3 }.code(), "E2004");
        assert_eq!(RelayError::Configuration { message: String::new() }.code(), "E3001");
    }

    #[test]
    fn authentication_errors_carry_reasons() {
        assert_eq!(RelayError::InvalidSignature.reason(), Some("invalid_signature"));
        assert_eq!(RelayError::MissingTimestamp.reason(), Some("missing_timestamp"));
        assert!(RelayError::TimestampOutOfWindow.is_authentication());
        assert!(!RelayError::MalformedPayload { reason: "x".into() }.is_authentication());
        assert_eq!(RelayError::MalformedPayload { reason: "x".into() }.reason(), None);
    }

    #[test]
    fn only_transient_forwarding_errors_retry() {
        assert!(RelayError::DestinationUnavailable { status: 503 }.is_retryable());
        assert!(RelayError::NetworkFailure { message: "reset".into() }.is_retryable());
        assert!(!RelayError::DestinationRejected { status: 400 }.is_retryable());
        assert!(!RelayError::InvalidSignature.is_retryable());
        assert!(!RelayError::Configuration { message: "no secret".into() }.is_retryable());
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(RelayError::InvalidSignature.to_string(), "[E1003] invalid_signature");
    }
}
