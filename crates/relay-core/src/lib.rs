//! Core domain models and shared infrastructure for the webhook relay.
//!
//! Provides strongly-typed event, fingerprint, envelope and outcome models,
//! the two trust-domain secret types, the error taxonomy, the clock
//! abstraction and the PostgreSQL repositories. The delivery and API crates
//! build on these.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod secrets;
pub mod storage;
pub mod time;

pub use error::{CoreError, RelayError, Result};
pub use models::{
    AdaptedEnvelope, EventFingerprint, EventId, IdempotencyStrategy, InboundEvent, OutcomeRecord,
    OutcomeStatus,
};
pub use secrets::{InboundSecret, OutboundSecret, MIN_SECRET_LEN};
pub use time::{Clock, RealClock, TestClock};
