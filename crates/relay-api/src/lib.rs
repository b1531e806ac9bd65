//! Webhook relay HTTP API.
//!
//! Inbound signature verification, the ingest pipeline, the axum router with
//! its ingest, health and admin handlers, and layered configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod retention;
pub mod server;
pub mod state;

pub use config::{Config, RetentionConfig, VerifierConfig};
pub use crypto::{RejectReason, SignatureVerifier, Verification};
pub use pipeline::{Acceptance, Pipeline, MAX_PAYLOAD_SIZE};
pub use retention::{RetentionSweeper, SweepReport};
pub use server::{create_router, serve, shutdown_signal, start_server};
pub use state::{AppState, Components, DatabaseProbe};
