//! Error types for the forwarding stage.
//!
//! Every failure a forwarding attempt can hit is represented here and
//! classified as retryable or terminal. None of these reach the original
//! sender; they end up in the outcome store and the logs.

use relay_core::RelayError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Forwarding failure classes.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection could not be established or was reset.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// Request did not complete within the client timeout.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// Destination answered 4xx other than 429.
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Destination answered 5xx.
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Destination answered 429.
    #[error("rate limited: HTTP 429")]
    RateLimited {
        /// Seconds from the `Retry-After` header, if parseable
        retry_after_seconds: Option<u64>,
        /// Response body content
        body: String,
    },

    /// Destination answered a status outside the defined ranges.
    #[error("unexpected response: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// All attempts failed with retryable errors.
    #[error("delivery failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// Destination URL or outbound secret is not configured.
    #[error("invalid destination configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// The envelope could not be serialized for signing.
    #[error("envelope serialization failed: {message}")]
    SerializationError {
        /// Serializer message
        message: String,
    },

    /// The forwarding task ended without producing a result.
    #[error("internal delivery error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Classifies an HTTP response that did not succeed.
    ///
    /// Returns `None` for 2xx and 3xx, which count as delivered.
    pub fn from_status(
        status_code: u16,
        body: impl Into<String>,
        retry_after_seconds: Option<u64>,
    ) -> Option<Self> {
        let body = body.into();
        match status_code {
            200..=399 => None,
            429 => Some(Self::RateLimited { retry_after_seconds, body }),
            400..=499 => Some(Self::ClientError { status_code, body }),
            500..=599 => Some(Self::ServerError { status_code, body }),
            _ => Some(Self::UnexpectedStatus { status_code, body }),
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// True for network errors, timeouts, 5xx and 429. Everything else is
    /// terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ServerError { .. }
            | Self::RateLimited { .. } => true,

            Self::ClientError { .. }
            | Self::UnexpectedStatus { .. }
            | Self::RetriesExhausted { .. }
            | Self::ConfigurationError { .. }
            | Self::SerializationError { .. }
            | Self::InternalError { .. } => false,
        }
    }

    /// Delay requested by the destination via `Retry-After`.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds, .. } => *retry_after_seconds,
            _ => None,
        }
    }

    /// HTTP status observed, if the destination answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnexpectedStatus { status_code, .. } => Some(*status_code),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Code stored in the outcome record.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NetworkError { .. } => "network_error",
            Self::Timeout { .. } => "timeout",
            Self::ClientError { .. } => "client_error",
            Self::ServerError { .. } => "server_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::ConfigurationError { .. } => "configuration_error",
            Self::SerializationError { .. } => "serialization_error",
            Self::InternalError { .. } => "internal_error",
        }
    }
}

impl From<&DeliveryError> for RelayError {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { message } => {
                Self::NetworkFailure { message: message.clone() }
            },
            DeliveryError::Timeout { timeout_seconds } => {
                Self::NetworkFailure { message: format!("timeout after {timeout_seconds}s") }
            },
            DeliveryError::ServerError { status_code, .. } => {
                Self::DestinationUnavailable { status: *status_code }
            },
            DeliveryError::RateLimited { .. } => Self::DestinationUnavailable { status: 429 },
            DeliveryError::ClientError { status_code, .. }
            | DeliveryError::UnexpectedStatus { status_code, .. } => {
                Self::DestinationRejected { status: *status_code }
            },
            DeliveryError::RetriesExhausted { attempts } => {
                Self::RetriesExhausted { attempts: *attempts }
            },
            DeliveryError::ConfigurationError { message } => {
                Self::Configuration { message: message.clone() }
            },
            DeliveryError::SerializationError { message }
            | DeliveryError::InternalError { message } => {
                Self::Other(anyhow::anyhow!(message.clone()))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(DeliveryError::from_status(200, "", None).is_none());
        assert!(DeliveryError::from_status(201, "", None).is_none());
        assert!(DeliveryError::from_status(302, "", None).is_none());

        let bad_request = DeliveryError::from_status(400, "bad", None).unwrap();
        assert!(!bad_request.is_retryable());
        assert_eq!(bad_request.error_code(), "client_error");

        let rate_limited = DeliveryError::from_status(429, "", Some(5)).unwrap();
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after_seconds(), Some(5));

        let unavailable = DeliveryError::from_status(503, "", None).unwrap();
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status_code(), Some(503));
    }

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(DeliveryError::network("connection refused").is_retryable());
        assert!(DeliveryError::timeout(30).is_retryable());

        assert!(!DeliveryError::configuration("no outbound secret").is_retryable());
        assert!(!DeliveryError::RetriesExhausted { attempts: 3 }.is_retryable());
        assert!(!DeliveryError::internal("task panicked").is_retryable());
    }

    #[test]
    fn maps_into_relay_taxonomy() {
        let err = DeliveryError::from_status(404, "", None).unwrap();
        assert_eq!(RelayError::from(&err).code(), "E2001");

        let err = DeliveryError::from_status(500, "", None).unwrap();
        assert!(RelayError::from(&err).is_retryable());

        let err = DeliveryError::configuration("missing");
        assert_eq!(RelayError::from(&err).code(), "E3001");
    }

    #[test]
    fn error_display_format() {
        assert_eq!(DeliveryError::timeout(30).to_string(), "request timeout after 30s");
        assert_eq!(
            DeliveryError::RetriesExhausted { attempts: 3 }.to_string(),
            "delivery failed after 3 attempts"
        );
    }
}
