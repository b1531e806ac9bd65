//! Signed event intake.
//!
//! Reads the signature headers and raw body, runs the pipeline and answers
//! before forwarding starts.

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use relay_core::{InboundEvent, RelayError};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::error_response;
use crate::{
    pipeline::{Acceptance, MAX_PAYLOAD_SIZE},
    AppState,
};

/// Acknowledgment returned to the sender.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Internal id assigned to a newly accepted event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// `received` or `duplicate`
    pub status: &'static str,
}

/// Accepts one signed event.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 401: missing or invalid signature, missing or stale timestamp
/// - 400: body is not a JSON object
/// - 413: payload too large (>10MB)
/// - 500: replay store unavailable
#[instrument(
    name = "ingest_event",
    skip_all,
    fields(
        path = %uri.path(),
        content_length = headers.get("content-length").and_then(|v| v.to_str().ok()).unwrap_or("unknown"),
        correlation_id = headers.get("x-correlation-id").and_then(|v| v.to_str().ok()).unwrap_or("none"),
    )
)]
pub async fn ingest_event(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let size_bytes = headers
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_PAYLOAD_SIZE + 1);
            warn!(size_bytes, limit = MAX_PAYLOAD_SIZE, "Payload exceeds size limit");
            return create_error_response(&RelayError::PayloadTooLarge { size_bytes });
        },
        Err(rejection) => {
            warn!(error = %rejection, "Failed to read request body");
            return create_error_response(&RelayError::MalformedPayload {
                reason: rejection.body_text(),
            });
        },
    };

    let event = InboundEvent {
        path: uri.path().to_string(),
        body,
        content_type: header_value(&headers, "content-type"),
        signature: header_value(&headers, "x-signature"),
        timestamp: header_value(&headers, "x-timestamp"),
        idempotency_key: header_value(&headers, "x-idempotency-key"),
        correlation_id: header_value(&headers, "x-correlation-id")
            .filter(|c| !c.trim().is_empty()),
    };

    match state.pipeline.accept(event).await {
        Ok(Acceptance::Accepted { event_id }) => {
            info!(%event_id, "Event acknowledged");
            (
                StatusCode::OK,
                Json(IngestResponse { event_id: Some(event_id.to_string()), status: "received" }),
            )
                .into_response()
        },
        Ok(Acceptance::Duplicate) => {
            (StatusCode::OK, Json(IngestResponse { event_id: None, status: "duplicate" }))
                .into_response()
        },
        Err(e) => create_error_response(&e),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn status_for(error: &RelayError) -> StatusCode {
    match error {
        e if e.is_authentication() => StatusCode::UNAUTHORIZED,
        RelayError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
        RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn create_error_response(error: &RelayError) -> Response {
    let status = status_for(error);

    let message = match error.reason() {
        Some(reason) => reason.to_string(),
        None if status == StatusCode::INTERNAL_SERVER_ERROR => {
            error!(error = %error, "Ingest failed");
            "internal error".to_string()
        },
        None => error.to_string(),
    };

    error_response(status, error.code(), message)
}
