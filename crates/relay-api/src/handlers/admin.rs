//! Read-only queries over forwarding outcomes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{EventId, OutcomeRecord, OutcomeStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use uuid::Uuid;

use super::error_response;
use crate::AppState;

/// Default page size for `list_outcomes`.
pub const DEFAULT_LIST_LIMIT: i64 = 50;
/// Largest page `list_outcomes` returns.
pub const MAX_LIST_LIMIT: i64 = 500;

/// Query parameters for `GET /admin/outcomes`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Only return outcomes in this status
    pub status: Option<String>,
    /// Page size, clamped to `1..=MAX_LIST_LIMIT`
    pub limit: Option<i64>,
}

/// Page of outcome records, newest first.
#[derive(Debug, Serialize)]
pub struct OutcomeList {
    /// Number of records returned
    pub count: usize,
    /// The records
    pub outcomes: Vec<OutcomeRecord>,
}

/// `GET /admin/outcomes/{event_id}`
#[instrument(name = "get_outcome", skip(state))]
pub async fn get_outcome(State(state): State<AppState>, Path(event_id): Path<String>) -> Response {
    let Ok(uuid) = Uuid::parse_str(&event_id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_event_id", "event id must be a UUID");
    };

    match state.outcomes.find(EventId(uuid)).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => {
            error_response(StatusCode::NOT_FOUND, "not_found", format!("no outcome for {event_id}"))
        },
        Err(e) => {
            error!(error = %e, "Failed to read outcome");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "internal error")
        },
    }
}

/// `GET /admin/outcomes?status=&limit=`
#[instrument(name = "list_outcomes", skip(state))]
pub async fn list_outcomes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let status = match params.status.as_deref().map(str::parse::<OutcomeStatus>).transpose() {
        Ok(status) => status,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, "invalid_status", message),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    match state.outcomes.list_recent(status, limit).await {
        Ok(outcomes) => {
            (StatusCode::OK, Json(OutcomeList { count: outcomes.len(), outcomes })).into_response()
        },
        Err(e) => {
            error!(error = %e, "Failed to list outcomes");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "internal error")
        },
    }
}
