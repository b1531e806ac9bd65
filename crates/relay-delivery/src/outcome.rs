//! Outcome recording.
//!
//! Every write is best effort: a failing store is logged and swallowed so
//! that recording never interrupts forwarding.

use std::{future::Future, pin::Pin, sync::Arc};

use relay_core::{Clock, EventId, OutcomeRecord, OutcomeStatus};
use tracing::{debug, warn};

use crate::{client::ForwardRequest, forwarder::AttemptObserver, storage::OutcomeStore};

/// Writes per-event forwarding status to the outcome store.
pub struct OutcomeRecorder {
    store: Arc<dyn OutcomeStore>,
    clock: Arc<dyn Clock>,
}

impl OutcomeRecorder {
    /// Creates a recorder over `store`.
    pub fn new(store: Arc<dyn OutcomeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Marks an event as in flight on attempt `attempt` (1-based).
    pub async fn record_processing(
        &self,
        event_id: EventId,
        attempt: u32,
        correlation_id: Option<String>,
    ) {
        let mut record = OutcomeRecord::received(event_id, correlation_id, self.clock.now_utc());
        record.status = OutcomeStatus::Processing;
        record.retry_count = retry_count(attempt);
        self.write(record).await;
    }

    /// Records terminal success.
    pub async fn record_success(
        &self,
        event_id: EventId,
        correlation_id: Option<String>,
        response_status: u16,
        retry_count: i32,
    ) {
        let mut record = OutcomeRecord::received(event_id, correlation_id, self.clock.now_utc());
        record.status = OutcomeStatus::Success;
        record.retry_count = retry_count;
        record.response_status = Some(i32::from(response_status));
        self.write(record).await;
    }

    /// Records terminal failure.
    pub async fn record_failure(
        &self,
        event_id: EventId,
        error_code: &str,
        error_message: &str,
        retry_count: i32,
        correlation_id: Option<String>,
        response_status: Option<u16>,
    ) {
        let mut record = OutcomeRecord::received(event_id, correlation_id, self.clock.now_utc());
        record.status = OutcomeStatus::Failed;
        record.error_code = Some(error_code.to_string());
        record.error_message = Some(error_message.to_string());
        record.retry_count = retry_count;
        record.response_status = response_status.map(i32::from);
        self.write(record).await;
    }

    async fn write(&self, record: OutcomeRecord) {
        let event_id = record.event_id;
        let status = record.status;

        match self.store.upsert(record).await {
            Ok(()) => debug!(%event_id, %status, "outcome recorded"),
            Err(e) => warn!(%event_id, %status, error = %e, "failed to record outcome"),
        }
    }
}

impl AttemptObserver for OutcomeRecorder {
    fn attempt_started<'a>(
        &'a self,
        request: &'a ForwardRequest,
        attempt: u32,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.record_processing(request.event_id, attempt, request.correlation_id.clone()))
    }
}

/// Retries performed before `attempt` (attempts minus one).
pub fn retry_count(attempts: u32) -> i32 {
    i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX)
}
