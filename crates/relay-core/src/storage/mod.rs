//! PostgreSQL repositories for the relay's two durable stores.
//!
//! The fingerprint table backs replay protection; the outcome table backs
//! audit and the admin read surface. Each table is mutated only through its
//! repository.

use std::sync::Arc;

use sqlx::PgPool;

pub mod fingerprints;
pub mod outcomes;

use crate::error::Result;

/// Container for the repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for accepted event fingerprints.
    pub fingerprints: Arc<fingerprints::Repository>,

    /// Repository for forwarding outcomes.
    pub outcomes: Arc<outcomes::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            fingerprints: Arc::new(fingerprints::Repository::new(pool.clone())),
            outcomes: Arc::new(outcomes::Repository::new(pool)),
        }
    }

    /// Verifies database connectivity with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.outcomes.pool()).await?;

        Ok(())
    }

    /// Creates the relay tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.outcomes.pool();

        for statement in SCHEMA {
            sqlx::query(statement).execute(&*pool).await?;
        }

        Ok(())
    }
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS event_fingerprints (
        id BIGSERIAL PRIMARY KEY,
        scope TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        strategy TEXT NOT NULL,
        accepted_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        UNIQUE(scope, strategy, fingerprint)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS forwarding_outcomes (
        event_id UUID PRIMARY KEY,
        status TEXT NOT NULL,
        error_code TEXT,
        error_message TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        response_status INTEGER,
        correlation_id TEXT,
        recorded_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_event_fingerprints_expiry
    ON event_fingerprints(expires_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_forwarding_outcomes_recent
    ON forwarding_outcomes(status, recorded_at DESC)
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Connection is lazy; queries run against a database in
        // tests/storage_test.rs.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
