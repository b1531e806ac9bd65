//! Replay protection over the fingerprint store.

use std::{sync::Arc, time::Duration};

use relay_core::{error::Result, Clock, EventFingerprint};
use tracing::debug;

use crate::storage::ReplayStore;

/// Decision for one fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayVerdict {
    /// First sighting within the retention window; the caller proceeds.
    Fresh,
    /// Already accepted recently; acknowledge without forwarding.
    Duplicate,
}

/// Decides whether an inbound event has been seen before.
///
/// The store's atomic claim is the decision; there is no separate read.
pub struct ReplayGuard {
    store: Arc<dyn ReplayStore>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl ReplayGuard {
    /// Creates a guard keeping fingerprints for `retention`.
    pub fn new(store: Arc<dyn ReplayStore>, retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, retention, clock }
    }

    /// Claims the fingerprint and reports whether it was fresh.
    ///
    /// # Errors
    ///
    /// Returns the store error if the claim could not be made.
    pub async fn check_and_record(&self, fingerprint: &EventFingerprint) -> Result<ReplayVerdict> {
        let accepted_at = self.clock.now_utc();
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let expires_at = accepted_at + retention;

        let claimed = self.store.claim(fingerprint, accepted_at, expires_at).await?;
        let verdict = if claimed { ReplayVerdict::Fresh } else { ReplayVerdict::Duplicate };

        debug!(
            fingerprint = %fingerprint,
            strategy = %fingerprint.strategy,
            ?verdict,
            "replay check"
        );

        Ok(verdict)
    }

    /// Drops fingerprints whose retention has elapsed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the purge failed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(self.clock.now_utc()).await
    }
}
