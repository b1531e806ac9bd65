//! Forwarding continuation for one accepted event.
//!
//! Adapts the payload, signs the envelope once, drives the forwarder and
//! records the terminal outcome. Missing destination configuration degrades
//! to a recorded `configuration_error` without any HTTP request.

use std::sync::Arc;

use relay_core::{Clock, EventId, OutboundSecret};
use serde_json::Value;
use tracing::{error, instrument};

use crate::{
    adapter::PayloadAdapter,
    client::ForwardRequest,
    error::DeliveryError,
    forwarder::{ForwardResult, Forwarder},
    outcome::OutcomeRecorder,
    signing::OutboundSigner,
};

/// Where and how envelopes are delivered.
#[derive(Debug, Clone, Default)]
pub struct DestinationConfig {
    /// Destination URL; forwarding is skipped when absent.
    pub url: Option<String>,
    /// Outbound signing secret; forwarding is skipped when absent.
    pub outbound_secret: Option<OutboundSecret>,
    /// Bearer token sent as `Authorization`, if configured.
    pub bearer_token: Option<String>,
    /// Value of the `X-Device-ID` header.
    pub device_id: String,
}

/// Runs the post-acknowledgment half of the pipeline.
pub struct Dispatcher {
    adapter: PayloadAdapter,
    forwarder: Forwarder,
    recorder: Arc<OutcomeRecorder>,
    destination: DestinationConfig,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(
        adapter: PayloadAdapter,
        forwarder: Forwarder,
        recorder: Arc<OutcomeRecorder>,
        destination: DestinationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { adapter, forwarder, recorder, destination, clock }
    }

    /// Outcome recorder shared with the caller.
    pub fn recorder(&self) -> &Arc<OutcomeRecorder> {
        &self.recorder
    }

    /// Forwards one event and records the result.
    ///
    /// Never fails; every problem ends up in the returned result and the
    /// outcome store.
    #[instrument(name = "dispatch", skip_all, fields(%event_id))]
    pub async fn dispatch(
        &self,
        event_id: EventId,
        payload: &Value,
        correlation_id: Option<String>,
    ) -> ForwardResult {
        let result = match self.prepare(event_id, payload, correlation_id.clone()) {
            Ok(request) => self.forwarder.send_with_retry(&request, self.recorder.as_ref()).await,
            Err(e) => {
                error!(error = %e, "forwarding skipped");
                ForwardResult::not_attempted(e)
            },
        };

        self.record(event_id, correlation_id, &result).await;
        result
    }

    /// Adapts and signs the event into the request reused by every attempt.
    fn prepare(
        &self,
        event_id: EventId,
        payload: &Value,
        correlation_id: Option<String>,
    ) -> Result<ForwardRequest, DeliveryError> {
        let url = self
            .destination
            .url
            .clone()
            .ok_or_else(|| DeliveryError::configuration("destination URL is not configured"))?;
        let secret = self
            .destination
            .outbound_secret
            .clone()
            .ok_or_else(|| DeliveryError::configuration("outbound secret is not configured"))?;

        let envelope = self.adapter.adapt(payload, event_id, correlation_id.clone());
        let signed = OutboundSigner::new(secret).sign(&envelope, self.clock.unix_seconds())?;

        Ok(ForwardRequest {
            event_id,
            url,
            body: signed.body,
            signature: signed.signature,
            timestamp: signed.timestamp,
            device_id: self.destination.device_id.clone(),
            bearer_token: self.destination.bearer_token.clone(),
            correlation_id,
        })
    }

    async fn record(&self, event_id: EventId, correlation_id: Option<String>, result: &ForwardResult) {
        if result.ok {
            self.recorder
                .record_success(
                    event_id,
                    correlation_id,
                    result.status.unwrap_or_default(),
                    result.retry_count(),
                )
                .await;
            return;
        }

        self.recorder
            .record_failure(
                event_id,
                result.error_code().unwrap_or("internal_error"),
                &result.error_message().unwrap_or_default(),
                result.retry_count(),
                correlation_id,
                result.status,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{OutcomeStatus, TestClock};
    use serde_json::json;

    use super::*;
    use crate::{
        client::ForwardingClient, retry::RetryPolicy, storage::mock::MemoryOutcomeStore,
    };

    fn dispatcher(destination: DestinationConfig) -> (Dispatcher, Arc<MemoryOutcomeStore>) {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::at_unix(1_700_000_000));
        let store = Arc::new(MemoryOutcomeStore::new());
        let recorder = Arc::new(OutcomeRecorder::new(store.clone(), clock.clone()));
        let forwarder = Forwarder::new(
            ForwardingClient::with_defaults().unwrap(),
            RetryPolicy::immediate(3),
            clock.clone(),
        );
        let adapter = PayloadAdapter::new("webhook-gateway", clock.clone());
        (Dispatcher::new(adapter, forwarder, recorder, destination, clock), store)
    }

    #[tokio::test]
    async fn missing_secret_records_configuration_error() {
        let (dispatcher, store) = dispatcher(DestinationConfig {
            url: Some("http://127.0.0.1:1/".into()),
            outbound_secret: None,
            bearer_token: None,
            device_id: "relay".into(),
        });
        let event_id = EventId::new();

        let result = dispatcher.dispatch(event_id, &json!({"id": "e"}), Some("c".into())).await;
        assert!(!result.ok);
        assert_eq!(result.attempts, 0);

        let stored = store.get(event_id).await.unwrap();
        assert_eq!(stored.status, OutcomeStatus::Failed);
        assert_eq!(stored.error_code.as_deref(), Some("configuration_error"));
        assert_eq!(stored.correlation_id.as_deref(), Some("c"));
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn missing_url_records_configuration_error() {
        let (dispatcher, store) = dispatcher(DestinationConfig {
            url: None,
            outbound_secret: Some(
                OutboundSecret::new("outbound-secret-0123456789abcdef0123").unwrap(),
            ),
            bearer_token: None,
            device_id: "relay".into(),
        });
        let event_id = EventId::new();

        dispatcher.dispatch(event_id, &json!({}), None).await;

        let stored = store.get(event_id).await.unwrap();
        assert_eq!(stored.error_code.as_deref(), Some("configuration_error"));
        assert!(stored.error_message.unwrap().contains("destination URL"));
    }
}
