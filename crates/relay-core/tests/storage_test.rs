//! Integration tests for the PostgreSQL repositories.
//!
//! Runs the production SQL against the database named by `DATABASE_URL`.
//! Every test works in its own fingerprint scope or event ids so tests can
//! share one database. Without `DATABASE_URL` the tests return early.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use relay_core::{
    storage::Storage, EventFingerprint, EventId, IdempotencyStrategy, OutcomeRecord,
    OutcomeStatus,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tokio::{sync::Mutex, task::JoinSet};
use uuid::Uuid;

static SCHEMA_READY: Mutex<bool> = Mutex::const_new(false);

async fn test_storage() -> Option<Storage> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping storage test");
        return None;
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(&url).await.unwrap();
    let storage = Storage::new(pool);

    let mut ready = SCHEMA_READY.lock().await;
    if !*ready {
        storage.migrate().await.unwrap();
        *ready = true;
    }

    Some(storage)
}

fn unique_scope() -> String {
    format!("/webhook/{}", Uuid::new_v4())
}

fn keyed(scope: &str, key: &str) -> EventFingerprint {
    EventFingerprint::derive(scope, Some(key), &json!({}), b"{}")
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

#[tokio::test]
async fn storage_health_check() {
    let Some(storage) = test_storage().await else { return };
    assert!(storage.health_check().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let Some(storage) = test_storage().await else { return };
    let fingerprint = keyed(&unique_scope(), "evt_race");
    let accepted_at = Utc::now();
    let expires_at = accepted_at + Duration::hours(1);

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let repo = storage.fingerprints.clone();
        let fingerprint = fingerprint.clone();
        tasks.spawn(async move { repo.claim(&fingerprint, accepted_at, expires_at).await.unwrap() });
    }

    let mut winners = 0;
    while let Some(claimed) = tasks.join_next().await {
        if claimed.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
}

#[tokio::test]
async fn expired_claim_is_taken_over() {
    let Some(storage) = test_storage().await else { return };
    let repo = &storage.fingerprints;
    let fingerprint = keyed(&unique_scope(), "evt_expiry");
    let accepted_at = Utc::now();
    let expires_at = accepted_at + Duration::hours(1);

    assert!(repo.claim(&fingerprint, accepted_at, expires_at).await.unwrap());

    let during = accepted_at + Duration::minutes(30);
    assert!(!repo.claim(&fingerprint, during, during + Duration::hours(1)).await.unwrap());

    let after = accepted_at + Duration::hours(2);
    assert!(repo.claim(&fingerprint, after, after + Duration::hours(1)).await.unwrap());
    assert!(!repo.claim(&fingerprint, after, after + Duration::hours(1)).await.unwrap());
}

#[tokio::test]
async fn key_and_provider_id_are_separate_claims() {
    let Some(storage) = test_storage().await else { return };
    let repo = &storage.fingerprints;
    let scope = unique_scope();
    let accepted_at = Utc::now();
    let expires_at = accepted_at + Duration::hours(1);

    let by_key = keyed(&scope, "evt_9");
    let by_id = EventFingerprint::derive(&scope, None, &json!({ "id": "evt_9" }), b"{}");
    assert_eq!(by_id.strategy, IdempotencyStrategy::SourceId);

    assert!(repo.claim(&by_key, accepted_at, expires_at).await.unwrap());
    assert!(repo.claim(&by_id, accepted_at, expires_at).await.unwrap());
}

#[tokio::test]
async fn purge_removes_expired_fingerprints() {
    let Some(storage) = test_storage().await else { return };
    let repo = &storage.fingerprints;
    let fingerprint = keyed(&unique_scope(), "evt_purge");

    // Far in the past so rows written by other tests are never affected.
    let accepted_at = at(946_684_800);
    let expires_at = accepted_at + Duration::hours(1);
    assert!(repo.claim(&fingerprint, accepted_at, expires_at).await.unwrap());

    assert!(repo.purge_expired(expires_at).await.unwrap() >= 1);

    // The row is gone, so a claim inside the old window succeeds again.
    let during = accepted_at + Duration::minutes(10);
    assert!(repo.claim(&fingerprint, during, expires_at).await.unwrap());
    repo.purge_expired(expires_at).await.unwrap();
}

#[tokio::test]
async fn upsert_keeps_existing_correlation_id() {
    let Some(storage) = test_storage().await else { return };
    let repo = &storage.outcomes;
    let event_id = EventId::new();
    let now = Utc::now();

    repo.upsert(&OutcomeRecord::received(event_id, Some("corr-db".into()), now)).await.unwrap();

    let mut update = OutcomeRecord::received(event_id, None, now + Duration::seconds(1));
    update.status = OutcomeStatus::Failed;
    update.error_code = Some("client_error".into());
    update.retry_count = 2;
    update.response_status = Some(400);
    repo.upsert(&update).await.unwrap();

    let stored = repo.find_by_id(event_id).await.unwrap().expect("record stored");
    assert_eq!(stored.status, OutcomeStatus::Failed);
    assert_eq!(stored.correlation_id.as_deref(), Some("corr-db"));
    assert_eq!(stored.error_code.as_deref(), Some("client_error"));
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.response_status, Some(400));

    assert!(repo.find_by_id(EventId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_recent_filters_by_status() {
    let Some(storage) = test_storage().await else { return };
    let repo = &storage.outcomes;

    // Recorded in the future so these rows sort ahead of everything else.
    let base = Utc::now() + Duration::days(36_500);
    let mut failed = Vec::new();
    for offset in 0..2 {
        let mut record = OutcomeRecord::received(EventId::new(), None, base + Duration::seconds(offset));
        record.status = OutcomeStatus::Failed;
        repo.upsert(&record).await.unwrap();
        failed.push(record.event_id);
    }
    let mut success = OutcomeRecord::received(EventId::new(), None, base + Duration::seconds(5));
    success.status = OutcomeStatus::Success;
    repo.upsert(&success).await.unwrap();

    let listed = repo.list_recent(Some(OutcomeStatus::Failed), 2).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|r| r.status == OutcomeStatus::Failed));
    assert_eq!(listed[0].event_id, failed[1]);
    assert_eq!(listed[1].event_id, failed[0]);

    let newest = repo.list_recent(None, 1).await.unwrap();
    assert_eq!(newest[0].event_id, success.event_id);

    sqlx::query("DELETE FROM forwarding_outcomes WHERE recorded_at >= $1")
        .bind(base)
        .execute(&*repo.pool())
        .await
        .unwrap();
}
