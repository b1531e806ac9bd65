//! Periodic removal of expired fingerprints and old outcome records.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use relay_core::Clock;
use relay_delivery::{OutcomeStore, ReplayGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired fingerprints deleted.
    pub fingerprints: u64,
    /// Outcome records deleted.
    pub outcomes: u64,
}

/// Background sweeper for both durable stores.
pub struct RetentionSweeper {
    replay_guard: Arc<ReplayGuard>,
    outcomes: Arc<dyn OutcomeStore>,
    config: RetentionConfig,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    /// Creates a sweeper.
    pub fn new(
        replay_guard: Arc<ReplayGuard>,
        outcomes: Arc<dyn OutcomeStore>,
        config: RetentionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { replay_guard, outcomes, config, clock }
    }

    /// Runs one sweep. Store failures are logged and counted as zero.
    pub async fn sweep_once(&self) -> SweepReport {
        let fingerprints = self.replay_guard.purge_expired().await.unwrap_or_else(|e| {
            warn!(error = %e, "fingerprint purge failed");
            0
        });

        let cutoff = ChronoDuration::from_std(self.config.outcomes)
            .ok()
            .and_then(|retention| self.clock.now_utc().checked_sub_signed(retention));
        let outcomes = match cutoff {
            Some(cutoff) => self.outcomes.purge_before(cutoff).await.unwrap_or_else(|e| {
                warn!(error = %e, "outcome purge failed");
                0
            }),
            None => 0,
        };

        let report = SweepReport { fingerprints, outcomes };
        if fingerprints + outcomes > 0 {
            info!(fingerprints, outcomes, "retention sweep removed expired rows");
        } else {
            debug!("retention sweep found nothing to remove");
        }
        report
    }

    /// Sweeps every `sweep_interval` until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(interval_secs = self.config.sweep_interval.as_secs(), "retention sweeper starting");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = self.clock.sleep(self.config.sweep_interval) => {
                    self.sweep_once().await;
                }
            }
        }

        info!("retention sweeper stopped");
    }
}
