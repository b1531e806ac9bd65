//! HTTP request handlers for the relay.
//!
//! Handlers are grouped by functionality:
//! - `ingest` - signed event intake
//! - `health` - health and liveness probes
//! - `admin` - read-only outcome queries
//!
//! # Error Handling
//!
//! Every error body has the same shape:
//! `{"error": {"code": "...", "message": "..."}}`. Ingress errors carry
//! codes from the relay taxonomy (E1001-E3002).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub mod admin;
pub mod health;
pub mod ingest;

pub use admin::{get_outcome, list_outcomes};
pub use health::{health_check, liveness_check};
pub use ingest::ingest_event;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail { code: code.into(), message: message.into() },
    };

    (status, Json(body)).into_response()
}
