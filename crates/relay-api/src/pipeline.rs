//! Ingest pipeline: the synchronous half up to acknowledgment and the
//! spawning of the forwarding continuation.
//!
//! `accept` verifies, validates and deduplicates an inbound event, assigns
//! its internal id and hands the rest to a task tracked by the pipeline.
//! The caller is answered as soon as `accept` returns; forwarding runs
//! independently and cannot be cancelled by the caller.

use std::sync::Arc;

use relay_core::{Clock, EventFingerprint, EventId, InboundEvent, RelayError};
use relay_delivery::{Dispatcher, ReplayGuard, ReplayVerdict};
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::crypto::{SignatureVerifier, Verification};

/// Maximum accepted inbound body size (10 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Result of a successful `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// New event; forwarding has been scheduled.
    Accepted {
        /// Internal id assigned to the event
        event_id: EventId,
    },
    /// Already accepted within the retention window; nothing scheduled.
    Duplicate,
}

/// Orchestrates one inbound event from verification to spawned forwarding.
pub struct Pipeline {
    verifier: SignatureVerifier,
    replay_guard: Arc<ReplayGuard>,
    dispatcher: Arc<Dispatcher>,
    tracker: TaskTracker,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Creates a pipeline.
    pub fn new(
        verifier: SignatureVerifier,
        replay_guard: Arc<ReplayGuard>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { verifier, replay_guard, dispatcher, tracker: TaskTracker::new(), clock }
    }

    /// Replay guard shared with the retention sweeper.
    pub fn replay_guard(&self) -> &Arc<ReplayGuard> {
        &self.replay_guard
    }

    /// Tracker of in-flight forwarding tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Verifies, validates and deduplicates `event`, then schedules
    /// forwarding.
    ///
    /// # Errors
    ///
    /// - Authentication errors (`MissingSignature`, `MissingTimestamp`,
    ///   `InvalidSignature`, `TimestampOutOfWindow`)
    /// - `PayloadTooLarge` or `MalformedPayload` for bodies failing
    ///   structural validation
    /// - `Storage` if the replay store is unavailable
    #[instrument(
        name = "pipeline_accept",
        skip_all,
        fields(path = %event.path, body_len = event.body.len())
    )]
    pub async fn accept(&self, event: InboundEvent) -> Result<Acceptance, RelayError> {
        if event.body.len() > MAX_PAYLOAD_SIZE {
            return Err(RelayError::PayloadTooLarge { size_bytes: event.body.len() });
        }

        let verification = self.verifier.verify(
            &event.path,
            &event.body,
            event.signature.as_deref(),
            event.timestamp.as_deref(),
            self.clock.unix_seconds(),
        );
        if let Verification::Reject(reason) = verification {
            warn!(%reason, "inbound event rejected");
            return Err(reason.into());
        }

        let payload = validate_payload(&event.body)?;

        let fingerprint = EventFingerprint::derive(
            &event.path,
            event.idempotency_key.as_deref(),
            &payload,
            &event.body,
        );

        if self.replay_guard.check_and_record(&fingerprint).await? == ReplayVerdict::Duplicate {
            info!(fingerprint = %fingerprint, "duplicate event acknowledged");
            return Ok(Acceptance::Duplicate);
        }

        let event_id = EventId::new();
        info!(%event_id, strategy = %fingerprint.strategy, "event accepted");

        self.spawn_forwarding(event_id, payload, event.correlation_id);

        Ok(Acceptance::Accepted { event_id })
    }

    /// Waits until every spawned forwarding task has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Spawns the supervised forwarding continuation.
    ///
    /// The work runs in its own task; the supervisor records an
    /// `internal_error` outcome if that task panics.
    fn spawn_forwarding(&self, event_id: EventId, payload: Value, correlation_id: Option<String>) {
        let dispatcher = self.dispatcher.clone();
        let span = tracing::info_span!("forwarding", %event_id);

        self.tracker.spawn(
            async move {
                let worker = {
                    let dispatcher = dispatcher.clone();
                    let correlation_id = correlation_id.clone();
                    tokio::spawn(
                        async move {
                            dispatcher.dispatch(event_id, &payload, correlation_id).await
                        }
                        .in_current_span(),
                    )
                };

                match worker.await {
                    Ok(result) => {
                        debug!(ok = result.ok, attempts = result.attempts, "forwarding finished");
                    },
                    Err(join_error) => {
                        error!(error = %join_error, "forwarding task aborted");
                        dispatcher
                            .recorder()
                            .record_failure(
                                event_id,
                                "internal_error",
                                &format!("forwarding task aborted: {join_error}"),
                                0,
                                correlation_id,
                                None,
                            )
                            .await;
                    },
                }
            }
            .instrument(span),
        );
    }
}

/// Structural validation of the inbound body.
///
/// The body must be a JSON object.
///
/// # Errors
///
/// Returns `MalformedPayload` describing the first problem found.
pub fn validate_payload(body: &[u8]) -> Result<Value, RelayError> {
    if body.is_empty() {
        return Err(RelayError::MalformedPayload { reason: "empty body".to_string() });
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::MalformedPayload { reason: format!("invalid JSON: {e}") })?;

    if !payload.is_object() {
        return Err(RelayError::MalformedPayload {
            reason: "payload must be a JSON object".to_string(),
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_is_valid() {
        let payload = validate_payload(br#"{"id":"evt_1"}"#).unwrap();
        assert_eq!(payload["id"], "evt_1");
    }

    #[test]
    fn out_of_range_numbers_are_valid_json() {
        let payload = validate_payload(br#"{"id":"evt_2","x":1e400}"#).unwrap();
        assert_eq!(payload["x"].to_string(), "1e400");
    }

    #[test]
    fn structural_failures_are_malformed() {
        for body in [&b""[..], b"not json", b"[1,2]", b"\"string\"", b"{\"open\":"] {
            let err = validate_payload(body).unwrap_err();
            assert_eq!(err.code(), "E1005", "body {:?}", String::from_utf8_lossy(body));
        }
    }
}
