//! Conversion of provider payloads into relay envelopes.

use std::sync::Arc;

use relay_core::{models::provider_event_id, AdaptedEnvelope, Clock, EventId};
use serde_json::Value;

/// Event type used when the provider payload carries none.
pub const DEFAULT_EVENT_TYPE: &str = "unknown";

/// Maps inbound payloads to [`AdaptedEnvelope`]s.
///
/// Adaptation is total: any JSON value produces an envelope. The original
/// payload is embedded unchanged and `occurred_at` is taken from the relay's
/// clock, never from the payload.
#[derive(Debug, Clone)]
pub struct PayloadAdapter {
    source: String,
    clock: Arc<dyn Clock>,
}

impl PayloadAdapter {
    /// Creates an adapter stamping envelopes with `source`.
    pub fn new(source: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { source: source.into(), clock }
    }

    /// Source identifier written into every envelope.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Builds the envelope for one accepted event.
    pub fn adapt(
        &self,
        payload: &Value,
        internal_event_id: EventId,
        correlation_id: Option<String>,
    ) -> AdaptedEnvelope {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_EVENT_TYPE)
            .to_string();

        let external_id =
            provider_event_id(payload).unwrap_or_else(|| internal_event_id.to_string());

        AdaptedEnvelope {
            source: self.source.clone(),
            event_type,
            external_id,
            payload: payload.clone(),
            occurred_at: self.clock.now_utc(),
            correlation_id,
            internal_event_id,
        }
    }
}
