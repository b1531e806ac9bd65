//! Webhook relay service.
//!
//! Main entry point. Initializes all subsystems and coordinates graceful
//! startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use relay_api::{AppState, Components, Config, RetentionSweeper};
use relay_core::{storage::Storage, RealClock};
use relay_delivery::{PostgresOutcomeStore, PostgresReplayStore};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight forwarding may run after the server stops.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting webhook relay");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        ingest_path = %config.ingest_path,
        destination_configured = config.destination_url.is_some(),
        max_connections = config.database_max_connections,
        "Configuration loaded"
    );
    let addr = config.parse_server_addr()?;

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    storage.migrate().await.context("Failed to create relay schema")?;
    info!("Database migrations completed");
    let clock = Arc::new(RealClock::new());
    let state = AppState::build(&config, Components {
        replay_store: Arc::new(PostgresReplayStore::new(storage.clone())),
        outcome_store: Arc::new(PostgresOutcomeStore::new(storage.clone())),
        probe: storage,
        clock: clock.clone(),
    })?;

    let shutdown = CancellationToken::new();

    let sweeper = RetentionSweeper::new(
        state.pipeline.replay_guard().clone(),
        state.outcomes.clone(),
        config.to_retention_config(),
        clock,
    );
    let sweeper_handle = tokio::spawn({
        let token = shutdown.clone();
        async move { sweeper.run(token).await }
    });

    tokio::spawn({
        let token = shutdown.clone();
        async move {
            relay_api::shutdown_signal().await;
            token.cancel();
        }
    });

    info!(%addr, "Relay is ready to receive webhooks");

    let pipeline = state.pipeline.clone();
    if let Err(e) = relay_api::start_server(state, addr, shutdown.clone().cancelled_owned()).await {
        error!(error = %e, "Server failed");
        shutdown.cancel();
    }

    let tracker = pipeline.tracker();
    tracker.close();
    info!(in_flight = tracker.len(), "Waiting for in-flight forwarding to finish");
    if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, tracker.wait()).await.is_err() {
        warn!(remaining = tracker.len(), "Shutdown grace period expired");
    }

    if let Err(e) = sweeper_handle.await {
        error!(error = %e, "Retention sweeper panicked");
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("Relay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relay=debug,tower_http=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
