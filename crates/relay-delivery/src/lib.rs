//! Forwarding half of the webhook relay.
//!
//! Turns an accepted inbound payload into a signed envelope and delivers it
//! to the single configured destination:
//!
//! 1. **Adapt** - [`PayloadAdapter`] wraps the payload in an
//!    [`AdaptedEnvelope`](relay_core::AdaptedEnvelope)
//! 2. **Sign** - [`OutboundSigner`] signs the compact JSON once with the
//!    outbound secret
//! 3. **Forward** - [`Forwarder`] sends the identical request until the
//!    destination accepts it, rejects it, or the attempt budget runs out
//! 4. **Record** - [`OutcomeRecorder`] upserts the per-event status
//!
//! Replay protection ([`ReplayGuard`]) also lives here because it shares
//! the storage abstraction with the recorder.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay_core::RealClock;
//! use relay_delivery::{ForwardingClient, Forwarder, RetryPolicy};
//!
//! # async fn example(request: relay_delivery::ForwardRequest) -> relay_delivery::Result<()> {
//! let forwarder =
//!     Forwarder::new(ForwardingClient::with_defaults()?, RetryPolicy::default(), Arc::new(RealClock));
//! let result = forwarder.send_with_retry(&request, &relay_delivery::NoopObserver).await;
//! println!("ok={} attempts={}", result.ok, result.attempts);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod forwarder;
pub mod outcome;
pub mod replay;
pub mod retry;
pub mod signing;
pub mod storage;

pub use adapter::PayloadAdapter;
pub use client::{ClientConfig, ForwardRequest, ForwardResponse, ForwardingClient};
pub use dispatch::{DestinationConfig, Dispatcher};
pub use error::{DeliveryError, Result};
pub use forwarder::{
    AttemptObservation, AttemptObserver, ForwardResult, ForwardState, Forwarder, NoopObserver,
    RetryAttempt,
};
pub use outcome::OutcomeRecorder;
pub use replay::{ReplayGuard, ReplayVerdict};
pub use retry::{RetryDecision, RetryPolicy};
pub use signing::{OutboundSigner, SignedEnvelope};
pub use storage::{OutcomeStore, PostgresOutcomeStore, PostgresReplayStore, ReplayStore};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
