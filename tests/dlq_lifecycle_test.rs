//! Dead-letter lifecycle tests: record through classification, retry,
//! bulk remediation, retention pruning, and the string-addressed admin
//! dispatch.

use chrono::{Duration, Utc};
use crawler_core::config::DlqConfig;
use crawler_core::constants::{CatalogTier, CrawlReason, FailureClass};
use crawler_core::dlq::{
    handle_failure_action, handle_prune, AdminOutcome, DeadLetterManager, FailureStore,
    InMemoryFailureStore, RetryOutcome,
};
use crawler_core::messaging::{CrawlJobEnvelope, InMemoryTransport, JobTransport};
use std::sync::Arc;

struct Harness {
    manager: DeadLetterManager,
    store: Arc<InMemoryFailureStore>,
    transport: Arc<InMemoryTransport>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryFailureStore::new());
    let transport = Arc::new(InMemoryTransport::new());
    let manager = DeadLetterManager::new(
        DlqConfig::default(),
        Arc::clone(&store) as Arc<dyn FailureStore>,
        Arc::clone(&transport) as Arc<dyn JobTransport>,
    )
    .expect("default rules compile");
    Harness {
        manager,
        store,
        transport,
    }
}

fn envelope_payload(job_id: &str) -> serde_json::Value {
    serde_json::to_value(CrawlJobEnvelope {
        job_id: job_id.to_string(),
        source_id: "mangadex".to_string(),
        catalog_tier: CatalogTier::B,
        reason: CrawlReason::Scheduled,
        priority: 0,
        payload: serde_json::json!({"series_id": 7}),
        enqueued_at: Utc::now(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_full_failure_lifecycle() {
    let h = harness();

    // Worker reports a transient failure
    let record = h
        .manager
        .record(
            "crawl-chapters",
            "job-7",
            envelope_payload("job-7"),
            "ECONNRESET while fetching chapter list",
        )
        .await
        .unwrap();
    assert!(record.is_open());
    assert_eq!(
        h.manager.classify(&record.error_message),
        FailureClass::Transient
    );

    // Operator retries it
    assert_eq!(h.manager.retry(record.id).await.unwrap(), RetryOutcome::Enqueued);

    // The replayed job carries a fresh idempotency key and the original data
    let jobs = h.transport.enqueued("crawl-chapters");
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].job_id.starts_with("job-7-retry-"));
    assert_eq!(jobs[0].payload["series_id"], 7);

    // The record is resolved; a second retry conflicts and enqueues nothing
    assert_eq!(h.manager.retry(record.id).await.unwrap(), RetryOutcome::Conflict);
    assert_eq!(h.transport.enqueued_count("crawl-chapters"), 1);
}

#[tokio::test]
async fn test_retry_rollback_keeps_record_actionable() {
    let h = harness();
    let record = h
        .manager
        .record("crawl-chapters", "job-7", envelope_payload("job-7"), "timed out")
        .await
        .unwrap();

    h.transport.fail_enqueues(true);
    assert!(h.manager.retry(record.id).await.is_err());

    // The claim was rolled back, so the record still shows in analyze
    let analysis = h.manager.analyze().await.unwrap();
    assert_eq!(analysis.total, 1);
    assert_eq!(analysis.transient_count, 1);
}

#[tokio::test]
async fn test_auto_resolve_sweep_touches_only_transient() {
    let h = harness();

    for i in 0..3 {
        h.manager
            .record(
                "crawl-metadata",
                &format!("t-{i}"),
                serde_json::json!({}),
                "connection reset by peer",
            )
            .await
            .unwrap();
    }
    h.manager
        .record("crawl-metadata", "p-0", serde_json::json!({}), "404 not found")
        .await
        .unwrap();
    h.manager
        .record("crawl-metadata", "u-0", serde_json::json!({}), "inexplicable")
        .await
        .unwrap();

    // Dry run previews without mutating
    assert_eq!(h.manager.auto_resolve_transient(true).await.unwrap(), 3);
    assert_eq!(h.manager.analyze().await.unwrap().total, 5);

    assert_eq!(h.manager.auto_resolve_transient(false).await.unwrap(), 3);
    let analysis = h.manager.analyze().await.unwrap();
    assert_eq!(analysis.total, 2);
    assert_eq!(analysis.permanent_count, 1);
    assert_eq!(analysis.unknown_count, 1);
}

#[tokio::test]
async fn test_prune_retention_matrix() {
    let h = harness();

    // Resolved 40 days ago: eligible
    let old_resolved = h
        .manager
        .record("q", "old", serde_json::json!({}), "boom")
        .await
        .unwrap();
    h.store
        .mark_resolved_if_open(old_resolved.id, Utc::now() - Duration::days(40))
        .await
        .unwrap();

    // Resolved 10 days ago: kept
    let fresh_resolved = h
        .manager
        .record("q", "fresh", serde_json::json!({}), "boom")
        .await
        .unwrap();
    h.store
        .mark_resolved_if_open(fresh_resolved.id, Utc::now() - Duration::days(10))
        .await
        .unwrap();

    // Still open: never pruned regardless of age
    let open = h
        .manager
        .record("q", "open", serde_json::json!({}), "boom")
        .await
        .unwrap();

    // Dry run previews the same count the real sweep deletes
    assert_eq!(h.manager.prune_old_resolved(30, true).await.unwrap(), 1);
    assert!(h.store.find(old_resolved.id).await.unwrap().is_some());

    assert_eq!(h.manager.prune_old_resolved(30, false).await.unwrap(), 1);
    assert!(h.store.find(old_resolved.id).await.unwrap().is_none());
    assert!(h.store.find(fresh_resolved.id).await.unwrap().is_some());
    assert!(h.store.find(open.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_analyze_orders_groups_by_frequency() {
    let h = harness();

    for i in 0..5 {
        h.manager
            .record("q", &format!("a-{i}"), serde_json::json!({}), "timed out")
            .await
            .unwrap();
    }
    for i in 0..2 {
        h.manager
            .record("q", &format!("b-{i}"), serde_json::json!({}), "404 not found")
            .await
            .unwrap();
    }

    let analysis = h.manager.analyze().await.unwrap();
    assert_eq!(analysis.by_error_pattern.len(), 2);
    assert_eq!(analysis.by_error_pattern[0].count, 5);
    assert_eq!(
        analysis.by_error_pattern[0].classification,
        FailureClass::Transient
    );
    assert_eq!(analysis.by_error_pattern[1].count, 2);
    assert_eq!(
        analysis.by_error_pattern[1].classification,
        FailureClass::Permanent
    );
}

#[tokio::test]
async fn test_admin_dispatch_end_to_end() {
    let h = harness();
    let record = h
        .manager
        .record("crawl-chapters", "job-1", envelope_payload("job-1"), "timed out")
        .await
        .unwrap();
    let id = record.id.to_string();

    let retried = handle_failure_action(&h.manager, "retry", &id).await.unwrap();
    assert_eq!(retried.http_status(), 200);
    assert_eq!(h.transport.enqueued_count("crawl-chapters"), 1);

    // Already resolved by the retry
    let resolved = handle_failure_action(&h.manager, "resolve", &id).await.unwrap();
    assert_eq!(resolved.http_status(), 409);

    let deleted = handle_failure_action(&h.manager, "delete", &id).await.unwrap();
    assert_eq!(deleted.http_status(), 200);
    assert_eq!(
        handle_failure_action(&h.manager, "retry", &id).await.unwrap(),
        AdminOutcome::NotFound
    );

    let bad = handle_failure_action(&h.manager, "retry", "definitely-not-a-uuid")
        .await
        .unwrap();
    assert_eq!(bad.http_status(), 400);

    let pruned = handle_prune(&h.manager, false).await.unwrap();
    assert_eq!(pruned.http_status(), 200);
}

#[tokio::test]
async fn test_listing_pages_newest_first() {
    let h = harness();
    for i in 0..5 {
        h.manager
            .record("q", &format!("job-{i}"), serde_json::json!({}), "boom")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let page = h.manager.list(Some(3), 0).await.unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].job_id, "job-4");

    let rest = h.manager.list(Some(3), 3).await.unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[1].job_id, "job-0");
}
