//! Repository for accepted event fingerprints.
//!
//! The insert itself is the replay decision: a single statement either
//! claims the fingerprint or reports that a live claim already exists, so
//! concurrent requests carrying the same fingerprint cannot both win.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{error::Result, models::EventFingerprint};

/// Repository for the `event_fingerprints` table.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Claims a fingerprint until `expires_at`.
    ///
    /// Returns `true` when the fingerprint was absent or its previous claim
    /// had expired, `false` when a live claim exists. Relies on the
    /// `UNIQUE(scope, strategy, fingerprint)` constraint, so an idempotency
    /// key never collides with a provider id of the same text. An expired
    /// row is taken over in the same statement.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn claim(
        &self,
        fingerprint: &EventFingerprint,
        accepted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO event_fingerprints (scope, fingerprint, strategy, accepted_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (scope, strategy, fingerprint) DO UPDATE
               SET accepted_at = EXCLUDED.accepted_at,
                   expires_at = EXCLUDED.expires_at
             WHERE event_fingerprints.expires_at <= EXCLUDED.accepted_at
            RETURNING fingerprint
            "#,
        )
        .bind(&fingerprint.scope)
        .bind(&fingerprint.value)
        .bind(fingerprint.strategy.as_str())
        .bind(accepted_at)
        .bind(expires_at)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    /// Deletes fingerprints whose retention has elapsed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM event_fingerprints WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
