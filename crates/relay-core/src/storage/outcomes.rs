//! Repository for forwarding outcome records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{EventId, OutcomeRecord, OutcomeStatus},
};

/// Repository for the `forwarding_outcomes` table.
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

    /// Inserts or replaces the record for `record.event_id`.
    ///
    /// A correlation id already stored is kept when the update carries none.
    ///
    /// # Errors
    ///
    /// Returns error if the upsert fails.
    pub async fn upsert(&self, record: &OutcomeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forwarding_outcomes (
                event_id, status, error_code, error_message, retry_count,
                response_status, correlation_id, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) DO UPDATE
               SET status = EXCLUDED.status,
                   error_code = EXCLUDED.error_code,
                   error_message = EXCLUDED.error_message,
                   retry_count = EXCLUDED.retry_count,
                   response_status = EXCLUDED.response_status,
                   correlation_id = COALESCE(EXCLUDED.correlation_id, forwarding_outcomes.correlation_id),
                   recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(record.event_id)
        .bind(record.status)
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(record.retry_count)
        .bind(record.response_status)
        .bind(&record.correlation_id)
        .bind(record.recorded_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds the record for an event.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, event_id: EventId) -> Result<Option<OutcomeRecord>> {
        let record = sqlx::query_as::<_, OutcomeRecord>(
            r#"
            SELECT event_id, status, error_code, error_message, retry_count,
                   response_status, correlation_id, recorded_at
            FROM forwarding_outcomes
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(record)
    }

    /// Lists the most recent records, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_recent(
        &self,
        status: Option<OutcomeStatus>,
        limit: i64,
    ) -> Result<Vec<OutcomeRecord>> {
        let records = sqlx::query_as::<_, OutcomeRecord>(
            r#"
            SELECT event_id, status, error_code, error_message, retry_count,
                   response_status, correlation_id, recorded_at
            FROM forwarding_outcomes
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(records)
    }

    /// Deletes records last updated before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM forwarding_outcomes WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
