//! Retry state machine around the forwarding client.
//!
//! One call drives a single prepared request through
//! `NotStarted -> Attempting(n) -> {Succeeded, FailedTerminal, FailedExhausted}`.
//! The same request, byte for byte, is sent on every attempt. The result is
//! always returned, never raised.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use relay_core::Clock;
use tracing::{error, info, warn};

use crate::{
    client::{ForwardRequest, ForwardingClient},
    error::DeliveryError,
    retry::{RetryContext, RetryDecision, RetryPolicy},
};

/// Position in the forwarding state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    /// No attempt made yet.
    NotStarted,
    /// Attempt `n` (1-based) in progress.
    Attempting(u32),
    /// Destination answered 2xx or 3xx.
    Succeeded,
    /// Non-retryable failure.
    FailedTerminal,
    /// Retryable failure on the last allowed attempt.
    FailedExhausted,
}

impl ForwardState {
    /// Whether the machine has stopped.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal | Self::FailedExhausted)
    }
}

/// What one attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptObservation {
    /// Destination answered with this status.
    Status(u16),
    /// Request failed before a response; carries the error code.
    Transport(&'static str),
}

/// Trace of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Attempt ordinal, starting at 1.
    pub number: u32,
    /// Status or transport failure observed.
    pub observed: AttemptObservation,
    /// Wait before the next attempt, if one follows.
    pub delay_before_next: Option<Duration>,
}

/// Final result of forwarding one event.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    /// Whether the destination accepted the event.
    pub ok: bool,
    /// Last HTTP status observed, if any response arrived.
    pub status: Option<u16>,
    /// Last response body, if any response arrived.
    pub body: Option<String>,
    /// Attempts made.
    pub attempts: u32,
    /// Terminal state reached.
    pub state: ForwardState,
    /// Failure that ended forwarding; `None` on success.
    pub error: Option<DeliveryError>,
    /// Per-attempt trace.
    pub history: Vec<RetryAttempt>,
}

impl ForwardResult {
    /// Result for forwarding that could not start, e.g. missing
    /// configuration.
    pub fn not_attempted(error: DeliveryError) -> Self {
        Self {
            ok: false,
            status: None,
            body: None,
            attempts: 0,
            state: ForwardState::FailedTerminal,
            error: Some(error),
            history: Vec::new(),
        }
    }

    /// Retries performed (attempts minus one).
    pub fn retry_count(&self) -> i32 {
        crate::outcome::retry_count(self.attempts)
    }

    /// Failure code for the outcome record.
    pub fn error_code(&self) -> Option<&'static str> {
        match (&self.state, &self.error) {
            (ForwardState::FailedExhausted, _) => Some("retries_exhausted"),
            (_, Some(error)) => Some(error.error_code()),
            _ => None,
        }
    }

    /// Failure detail for the outcome record.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(match self.state {
            ForwardState::FailedExhausted => {
                format!("gave up after {} attempts, last error: {error}", self.attempts)
            },
            _ => error.to_string(),
        })
    }
}

/// Hook invoked before each attempt.
pub trait AttemptObserver: Send + Sync {
    /// Called before attempt `attempt` (1-based) is sent.
    fn attempt_started<'a>(
        &'a self,
        request: &'a ForwardRequest,
        attempt: u32,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {
    fn attempt_started<'a>(
        &'a self,
        _request: &'a ForwardRequest,
        _attempt: u32,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// Sends a prepared request with bounded retries.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: ForwardingClient,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Forwarder {
    /// Creates a forwarder.
    pub fn new(client: ForwardingClient, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { client, policy, clock }
    }

    /// Retry policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the state machine to a terminal state.
    pub async fn send_with_retry(
        &self,
        request: &ForwardRequest,
        observer: &dyn AttemptObserver,
    ) -> ForwardResult {
        let mut state = ForwardState::NotStarted;
        let mut history = Vec::new();
        let mut last_status = None;
        let mut last_body = None;
        let mut attempt = 1;

        loop {
            state = next_state(state);
            tracing::debug!(event_id = %request.event_id, ?state, "forward state");
            observer.attempt_started(request, attempt).await;

            let failure = match self.client.send(request, attempt, self.clock.now_utc()).await {
                Ok(response) => {
                    last_status = Some(response.status_code);
                    match DeliveryError::from_status(
                        response.status_code,
                        response.body.clone(),
                        response.retry_after_seconds,
                    ) {
                        None => {
                            history.push(RetryAttempt {
                                number: attempt,
                                observed: AttemptObservation::Status(response.status_code),
                                delay_before_next: None,
                            });
                            info!(
                                event_id = %request.event_id,
                                status = response.status_code,
                                attempts = attempt,
                                "event forwarded"
                            );
                            return ForwardResult {
                                ok: true,
                                status: last_status,
                                body: Some(response.body),
                                attempts: attempt,
                                state: ForwardState::Succeeded,
                                error: None,
                                history,
                            };
                        },
                        Some(error) => {
                            last_body = Some(response.body);
                            error
                        },
                    }
                },
                Err(error) => error,
            };

            let observed = match failure.status_code() {
                Some(status) => AttemptObservation::Status(status),
                None => AttemptObservation::Transport(failure.error_code()),
            };

            let decision = RetryContext::new(attempt, &failure, &self.policy).decide();
            let delay = match decision {
                RetryDecision::Retry { delay } => Some(delay),
                RetryDecision::Terminal | RetryDecision::Exhausted => None,
            };
            history.push(RetryAttempt { number: attempt, observed, delay_before_next: delay });

            match decision {
                RetryDecision::Retry { delay } => {
                    warn!(
                        event_id = %request.event_id,
                        attempt,
                        error = %failure,
                        delay_ms = delay.as_millis(),
                        "forward attempt failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                },
                RetryDecision::Terminal | RetryDecision::Exhausted => {
                    let final_state = if decision == RetryDecision::Terminal {
                        ForwardState::FailedTerminal
                    } else {
                        ForwardState::FailedExhausted
                    };
                    error!(
                        event_id = %request.event_id,
                        attempts = attempt,
                        error = %failure,
                        state = ?final_state,
                        "forwarding failed"
                    );
                    return ForwardResult {
                        ok: false,
                        status: last_status,
                        body: last_body,
                        attempts: attempt,
                        state: final_state,
                        error: Some(failure),
                        history,
                    };
                },
            }
        }
    }
}

fn next_state(state: ForwardState) -> ForwardState {
    match state {
        ForwardState::NotStarted => ForwardState::Attempting(1),
        ForwardState::Attempting(n) => ForwardState::Attempting(n + 1),
        terminal => terminal,
    }
}
