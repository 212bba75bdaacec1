//! Concurrency tests for duplicate detection.
//!
//! Many tasks classifying one fingerprint must produce exactly one `New`
//! verdict and one stored row per attempt, against both stores.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use wechat_dedup::storage::{ContentStore, InMemoryStore, SqliteStore};
use wechat_dedup::{
    DeduplicationConfig, DeduplicationEngine, FilterHint, Fingerprint, IdentityKey,
    NewContentRecord, RecordQuery, RecordStatus, Verdict,
};

const TASKS: usize = 16;
const LOCATOR: &str = "https://mmbiz.qpic.cn/sz_mmbiz_jpg/abc/0";

async fn race(engine: Arc<DeduplicationEngine>, fingerprint: &Fingerprint) -> Vec<Verdict> {
    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let fingerprint = fingerprint.clone();
            tokio::spawn(async move {
                let owner = IdentityKey::new(format!("user_{}", i % 4)).unwrap();
                engine
                    .classify(&fingerprint, &owner, LOCATOR)
                    .await
                    .unwrap()
                    .verdict
            })
        })
        .collect();

    let mut verdicts = Vec::with_capacity(TASKS);
    for handle in handles {
        verdicts.push(handle.await.unwrap());
    }
    verdicts
}

async fn stored_statuses(store: &dyn ContentStore) -> Vec<RecordStatus> {
    let now = Utc::now();
    let query = RecordQuery::window(now - Duration::hours(1), now + Duration::hours(1));
    let mut statuses = Vec::new();
    for i in 0..4 {
        let owner = IdentityKey::new(format!("user_{i}")).unwrap();
        for record in store.records_by_owner(&owner, &query).await.unwrap() {
            statuses.push(record.status);
        }
    }
    statuses
}

fn assert_single_winner(verdicts: &[Verdict], statuses: &[RecordStatus]) {
    assert_eq!(verdicts.iter().filter(|v| v.is_new()).count(), 1);
    assert_eq!(statuses.len(), TASKS);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == RecordStatus::PendingConfirmation)
            .count(),
        1
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == RecordStatus::AutoDenied)
            .count(),
        TASKS - 1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_in_memory_store_single_new_verdict() {
    let store = Arc::new(InMemoryStore::new().with_latency(std::time::Duration::from_millis(2)));
    let engine = Arc::new(
        DeduplicationEngine::build(store.clone(), DeduplicationConfig::default(), Utc::now()).await,
    );

    let fingerprint = Fingerprint::parse("same-picture").unwrap();
    let verdicts = race(engine, &fingerprint).await;

    assert_single_winner(&verdicts, &stored_statuses(store.as_ref()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_sqlite_store_single_new_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("records.db")).unwrap());
    let engine = Arc::new(
        DeduplicationEngine::build(store.clone(), DeduplicationConfig::default(), Utc::now()).await,
    );

    let fingerprint = Fingerprint::parse("same-picture").unwrap();
    let verdicts = race(engine, &fingerprint).await;

    assert_single_winner(&verdicts, &stored_statuses(store.as_ref()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_fingerprints_are_all_new() {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(
        DeduplicationEngine::build(store.clone(), DeduplicationConfig::default(), Utc::now()).await,
    );

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let fingerprint = Fingerprint::parse(format!("picture-{i}")).unwrap();
                let owner = IdentityKey::new("user_1").unwrap();
                engine.classify(&fingerprint, &owner, LOCATOR).await.unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().verdict, Verdict::New);
    }
    assert_eq!(store.record_count(), 64);
}

#[tokio::test]
async fn test_rebuilt_filter_reports_maybe_seen() {
    let store = Arc::new(InMemoryStore::new());
    let owner = IdentityKey::new("user_1").unwrap();
    let fingerprint = Fingerprint::parse("seen-before").unwrap();

    let first = DeduplicationEngine::build(store.clone(), DeduplicationConfig::default(), Utc::now())
        .await;
    first.classify(&fingerprint, &owner, LOCATOR).await.unwrap();

    // A restart rebuilds the filter from the window.
    let second =
        DeduplicationEngine::build(store.clone(), DeduplicationConfig::default(), Utc::now()).await;
    let result = second.classify(&fingerprint, &owner, LOCATOR).await.unwrap();

    assert_eq!(result.verdict, Verdict::Duplicate);
    assert_eq!(result.filter_hint, FilterHint::MaybeSeen);
    assert!(!result.is_window_miss());
}

#[tokio::test]
async fn test_fingerprint_older_than_window_is_still_duplicate() {
    let store = Arc::new(InMemoryStore::new());
    let owner = IdentityKey::new("user_1").unwrap();
    let fingerprint = Fingerprint::parse("ancient").unwrap();

    let mut old = NewContentRecord::pending(fingerprint.clone(), owner.clone(), LOCATOR);
    old.created_at = Utc::now() - Duration::days(90);
    store.insert_if_fingerprint_absent(&old).await.unwrap();

    let engine = DeduplicationEngine::build(
        store.clone(),
        DeduplicationConfig::default().with_filter_window_days(28),
        Utc::now(),
    )
    .await;
    assert_eq!(engine.filter().map(|f| f.len()), Some(0));

    let result = engine.classify(&fingerprint, &owner, LOCATOR).await.unwrap();
    assert_eq!(result.verdict, Verdict::Duplicate);
    assert_eq!(result.filter_hint, FilterHint::Unseen);
    assert!(result.is_window_miss());
}
