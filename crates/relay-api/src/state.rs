//! Shared application state and component wiring.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::Result;
use relay_core::{storage::Storage, Clock};
use relay_delivery::{
    Dispatcher, Forwarder, ForwardingClient, OutcomeRecorder, OutcomeStore, PayloadAdapter,
    ReplayGuard, ReplayStore,
};
use secrecy::SecretString;

use crate::{config::Config, crypto::SignatureVerifier, pipeline::Pipeline};

/// Connectivity check used by `/health`.
pub trait DatabaseProbe: Send + Sync + 'static {
    /// Succeeds if the database answers a trivial query.
    fn ping(&self) -> Pin<Box<dyn Future<Output = relay_core::Result<()>> + Send + '_>>;
}

impl DatabaseProbe for Storage {
    fn ping(&self) -> Pin<Box<dyn Future<Output = relay_core::Result<()>> + Send + '_>> {
        Box::pin(self.health_check())
    }
}

/// Storage and time sources the relay is assembled from.
///
/// Production passes the PostgreSQL stores and `RealClock`; tests pass the
/// in-memory stores and a `TestClock`.
pub struct Components {
    /// Fingerprint store behind the replay guard.
    pub replay_store: Arc<dyn ReplayStore>,
    /// Outcome store behind the recorder and the admin surface.
    pub outcome_store: Arc<dyn OutcomeStore>,
    /// Database probe for `/health`.
    pub probe: Arc<dyn DatabaseProbe>,
    /// Shared clock.
    pub clock: Arc<dyn Clock>,
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Ingest pipeline.
    pub pipeline: Arc<Pipeline>,
    /// Outcome store read by the admin surface.
    pub outcomes: Arc<dyn OutcomeStore>,
    /// Database probe.
    pub probe: Arc<dyn DatabaseProbe>,
    /// Shared clock.
    pub clock: Arc<dyn Clock>,
    /// Admin bearer token; admin routes are closed while unset.
    pub admin_token: Option<Arc<SecretString>>,
    /// Route the pipeline is mounted on.
    pub ingest_path: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl AppState {
    /// Assembles the pipeline and its collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Fails if a secret is invalid or the HTTP client cannot be built.
    pub fn build(config: &Config, components: Components) -> Result<Self> {
        let Components { replay_store, outcome_store, probe, clock } = components;

        let verifier = SignatureVerifier::from_config(&config.to_verifier_config()?);
        let retention = config.to_retention_config();
        let replay_guard = Arc::new(ReplayGuard::new(replay_store, retention.replay, clock.clone()));

        let recorder = Arc::new(OutcomeRecorder::new(outcome_store.clone(), clock.clone()));
        let forwarder = Forwarder::new(
            ForwardingClient::new(config.to_client_config())?,
            config.to_retry_policy(),
            clock.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            PayloadAdapter::new(config.event_source.clone(), clock.clone()),
            forwarder,
            recorder,
            config.to_destination_config()?,
            clock.clone(),
        ));

        let pipeline = Arc::new(Pipeline::new(verifier, replay_guard, dispatcher, clock.clone()));

        Ok(Self {
            pipeline,
            outcomes: outcome_store,
            probe,
            clock,
            admin_token: config.admin_token.clone().map(Arc::new),
            ingest_path: config.ingest_path.clone(),
            request_timeout: Duration::from_secs(config.request_timeout),
        })
    }
}
