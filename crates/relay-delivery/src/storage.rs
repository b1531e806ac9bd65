//! Storage abstraction for replay protection and outcome recording.
//!
//! The guard and recorder depend on these traits rather than on PostgreSQL
//! directly, so pipeline logic can be exercised without a database. The
//! production implementations delegate to `relay_core::storage::Storage`.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use relay_core::{
    error::Result,
    models::{EventFingerprint, EventId, OutcomeRecord, OutcomeStatus},
    storage::Storage,
};

/// Durable set of recently accepted fingerprints.
pub trait ReplayStore: Send + Sync + 'static {
    /// Atomically claims a fingerprint until `expires_at`.
    ///
    /// Returns `true` if this call claimed it, `false` if a live claim
    /// already exists. Concurrent callers with the same fingerprint must not
    /// both receive `true`.
    fn claim(
        &self,
        fingerprint: &EventFingerprint,
        accepted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Removes claims that expired at or before `now`.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;
}

/// Durable per-event forwarding outcomes.
pub trait OutcomeStore: Send + Sync + 'static {
    /// Inserts or replaces the record for `record.event_id`.
    fn upsert(
        &self,
        record: OutcomeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds the record for an event.
    fn find(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutcomeRecord>>> + Send + '_>>;

    /// Lists the most recently recorded outcomes, newest first.
    fn list_recent(
        &self,
        status: Option<OutcomeStatus>,
        limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OutcomeRecord>>> + Send + '_>>;

    /// Removes records last updated before `cutoff`.
    fn purge_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;
}

/// PostgreSQL-backed [`ReplayStore`].
pub struct PostgresReplayStore {
    storage: Arc<Storage>,
}

impl PostgresReplayStore {
    /// Creates a new PostgreSQL replay store.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl ReplayStore for PostgresReplayStore {
    fn claim(
        &self,
        fingerprint: &EventFingerprint,
        accepted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let storage = self.storage.clone();
        let fingerprint = fingerprint.clone();
        Box::pin(async move {
            storage.fingerprints.claim(&fingerprint, accepted_at, expires_at).await
        })
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.fingerprints.purge_expired(now).await })
    }
}

/// PostgreSQL-backed [`OutcomeStore`].
pub struct PostgresOutcomeStore {
    storage: Arc<Storage>,
}

impl PostgresOutcomeStore {
    /// Creates a new PostgreSQL outcome store.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl OutcomeStore for PostgresOutcomeStore {
    fn upsert(
        &self,
        record: OutcomeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outcomes.upsert(&record).await })
    }

    fn find(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutcomeRecord>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outcomes.find_by_id(event_id).await })
    }

    fn list_recent(
        &self,
        status: Option<OutcomeStatus>,
        limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OutcomeRecord>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outcomes.list_recent(status, limit).await })
    }

    fn purge_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outcomes.purge_before(cutoff).await })
    }
}

pub mod mock {
    //! In-memory stores for tests.
    //!
    //! Both stores mirror the PostgreSQL semantics closely enough for
    //! pipeline tests: the replay store claims under a single write lock and
    //! honours expiry, the outcome store keeps a stored correlation id when
    //! an update carries none. Failures can be injected to exercise error
    //! paths.

    use std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use chrono::{DateTime, Utc};
    use relay_core::{
        error::{CoreError, Result},
        IdempotencyStrategy,
    };
    use tokio::sync::RwLock;

    use super::{EventFingerprint, EventId, OutcomeRecord, OutcomeStatus, OutcomeStore, ReplayStore};

    type ClaimKey = (String, IdempotencyStrategy, String);

    /// In-memory [`ReplayStore`].
    #[derive(Default)]
    pub struct MemoryReplayStore {
        claims: Arc<RwLock<HashMap<ClaimKey, DateTime<Utc>>>>,
        fail: AtomicBool,
    }

    impl MemoryReplayStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent call fail until reset.
        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        /// Number of fingerprints currently held, expired or not.
        pub async fn len(&self) -> usize {
            self.claims.read().await.len()
        }

        /// Whether no fingerprints are held.
        pub async fn is_empty(&self) -> bool {
            self.claims.read().await.is_empty()
        }
    }

    impl ReplayStore for MemoryReplayStore {
        fn claim(
            &self,
            fingerprint: &EventFingerprint,
            accepted_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
            let key = (fingerprint.scope.clone(), fingerprint.strategy, fingerprint.value.clone());
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(CoreError::Database("injected replay store failure".into()));
                }

                let mut claims = self.claims.write().await;
                match claims.get(&key) {
                    Some(existing) if *existing > accepted_at => Ok(false),
                    _ => {
                        claims.insert(key, expires_at);
                        Ok(true)
                    },
                }
            })
        }

        fn purge_expired(
            &self,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
            Box::pin(async move {
                let mut claims = self.claims.write().await;
                let before = claims.len();
                claims.retain(|_, expires_at| *expires_at > now);
                Ok((before - claims.len()) as u64)
            })
        }
    }

    /// In-memory [`OutcomeStore`] that also keeps every write in order.
    #[derive(Default)]
    pub struct MemoryOutcomeStore {
        records: Arc<RwLock<HashMap<EventId, OutcomeRecord>>>,
        history: Arc<RwLock<Vec<OutcomeRecord>>>,
        fail: AtomicBool,
    }

    impl MemoryOutcomeStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent write fail until reset.
        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        /// Every successful write, oldest first.
        pub async fn history(&self) -> Vec<OutcomeRecord> {
            self.history.read().await.clone()
        }

        /// Current record for an event.
        pub async fn get(&self, event_id: EventId) -> Option<OutcomeRecord> {
            self.records.read().await.get(&event_id).cloned()
        }
    }

    impl OutcomeStore for MemoryOutcomeStore {
        fn upsert(
            &self,
            mut record: OutcomeRecord,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(CoreError::Database("injected outcome store failure".into()));
                }

                let mut records = self.records.write().await;
                if record.correlation_id.is_none() {
                    record.correlation_id =
                        records.get(&record.event_id).and_then(|r| r.correlation_id.clone());
                }
                records.insert(record.event_id, record.clone());
                drop(records);

                self.history.write().await.push(record);
                Ok(())
            })
        }

        fn find(
            &self,
            event_id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<OutcomeRecord>>> + Send + '_>> {
            Box::pin(async move { Ok(self.records.read().await.get(&event_id).cloned()) })
        }

        fn list_recent(
            &self,
            status: Option<OutcomeStatus>,
            limit: i64,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<OutcomeRecord>>> + Send + '_>> {
            Box::pin(async move {
                let mut records: Vec<OutcomeRecord> = self
                    .records
                    .read()
                    .await
                    .values()
                    .filter(|r| status.map_or(true, |s| r.status == s))
                    .cloned()
                    .collect();
                records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
                records.truncate(usize::try_from(limit).unwrap_or(0));
                Ok(records)
            })
        }

        fn purge_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
            Box::pin(async move {
                let mut records = self.records.write().await;
                let before = records.len();
                records.retain(|_, r| r.recorded_at >= cutoff);
                Ok((before - records.len()) as u64)
            })
        }
    }

}
