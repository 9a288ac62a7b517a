//! Batch orchestration tests
//!
//! These tests verify:
//! - Collections are isolated from each other's extraction failures
//! - Invalid records are dropped while valid ones are dispatched
//! - Publish and archive failures do not affect each other
//! - Dead-letter forwarding never replaces the primary failure
//! - A stuck archive write times out and a panicking collection is aborted

mod common;

use common::*;
use forumpipe_common::types::DELETED_AUTHOR;
use forumpipe_ingest::archiver::{Archiver, CONTENT_TYPE_JSON};
use forumpipe_ingest::error::{ArchiveError, FetchError, PublishError, QueueError, StoreError};
use forumpipe_ingest::metrics::{
    Metrics, ARCHIVE_FAILED, ARCHIVE_SUCCEEDED, POSTS_EXTRACTED, PUBLISH_LATENCY_MS,
};
use forumpipe_ingest::orchestrator::CollectionStatus;
use forumpipe_ingest::publisher::Publisher;
use forumpipe_ingest::BatchRequest;
use forumpipe_common::types::CanonicalRecord;
use std::sync::Arc;
use std::time::Duration;

fn request(collections: &[&str]) -> BatchRequest {
    BatchRequest {
        collections: collections.iter().map(|c| c.to_string()).collect(),
        limit: 15,
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_end_to_end() {
    let source = ScriptedSource::new()
        .script(
            "dataengineering",
            vec![Ok(vec![
                raw_item("a1", Some("alice"), "dataengineering"),
                // Blank author: missing, not deleted
                raw_item("a2", Some(""), "dataengineering"),
            ])],
        )
        .script(
            "rust",
            vec![
                Err(FetchError::Transient("connection reset by peer".into())),
                Ok(vec![
                    raw_item("b1", Some("bob"), "rust"),
                    raw_item("b2", None, "rust"),
                ]),
            ],
        );
    let harness = Harness::new(source);
    let pipeline = harness.pipeline(&test_config(&[]));

    let report = pipeline.run_batch(&request(&["dataengineering", "rust"])).await;

    assert_eq!(report.collections.len(), 2);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.dropped(), 1);
    assert_eq!(report.published(), 3);
    assert_eq!(report.archived(), 3);

    assert_eq!(harness.source.calls_for("dataengineering"), 1);
    assert_eq!(harness.source.calls_for("rust"), 2);

    let sent = harness.queue.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(topic, _)| topic == TOPIC));
    assert_eq!(harness.store.keys().len(), 3);
    assert!(harness.dead_letter.sent().is_empty());

    let mut ids: Vec<String> = harness
        .queue
        .sent_records()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "b1", "b2"]);

    assert_eq!(harness.metrics.counter(POSTS_EXTRACTED), 4);
    assert_eq!(harness.metrics.counter(ARCHIVE_SUCCEEDED), 3);
    assert_eq!(harness.metrics.counter(ARCHIVE_FAILED), 0);
    assert_eq!(harness.metrics.latency_count(PUBLISH_LATENCY_MS), 3);
}

#[tokio::test]
async fn test_dispatched_records_are_stamped_and_complete() {
    let source = ScriptedSource::new().script(
        "rust",
        vec![Ok(vec![raw_item("b2", None, "rust")])],
    );
    let harness = Harness::new(source);
    let pipeline = harness.pipeline(&test_config(&[]));

    pipeline.run_batch(&request(&["rust"])).await;

    let records = harness.queue.sent_records();
    let record = &records[0];
    assert_eq!(record["author"], DELETED_AUTHOR);
    assert_eq!(record["subreddit"], "rust");
    assert!(record["created_utc"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
    assert!(record["extraction_timestamp"].is_string());
    assert!(record["processing_timestamp"].is_string());

    let key = &harness.store.keys()[0];
    let (bucket, key) = key.split_once('/').unwrap();
    assert_eq!(bucket, BUCKET);
    assert!(key.contains("/post_b2_"));
    assert!(key.ends_with(".json"));

    let object = harness.store.get(bucket, key).unwrap();
    assert_eq!(object.content_type, CONTENT_TYPE_JSON);
    let text = String::from_utf8(object.bytes).unwrap();
    assert!(text.contains("\n  \"id\": \"b2\""), "archive is not pretty-printed: {}", text);
    let archived: CanonicalRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(archived.id, "b2");
    assert!(archived.processed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_extraction_failure_does_not_abort_batch() {
    let source = ScriptedSource::new()
        .script(
            "dataengineering",
            vec![
                Err(FetchError::Transient("503".into())),
                Err(FetchError::Transient("503".into())),
                Err(FetchError::Transient("503".into())),
            ],
        )
        .script("rust", vec![Ok(vec![raw_item("b1", Some("bob"), "rust")])]);
    let harness = Harness::new(source);
    let pipeline = harness.pipeline(&test_config(&[]));

    let report = pipeline.run_batch(&request(&["dataengineering", "rust"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::ExtractionFailed);
    assert_eq!(report.collections[1].status, CollectionStatus::Completed);
    assert_eq!(harness.source.calls_for("dataengineering"), 3);
    assert_eq!(harness.queue.sent().len(), 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let harness = Harness::new(ScriptedSource::new());
    let pipeline = harness.pipeline(&test_config(&[]));

    let report = pipeline.run_batch(&request(&["doesnotexist"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::ExtractionFailed);
    assert_eq!(harness.source.calls_for("doesnotexist"), 1);
}

#[tokio::test]
async fn test_publish_failure_does_not_block_archive() {
    let source = ScriptedSource::new().script(
        "rust",
        vec![Ok(vec![
            raw_item("b1", Some("bob"), "rust"),
            raw_item("b2", Some("carol"), "rust"),
        ])],
    );
    let harness = Harness::new(source);
    harness.queue.set_failing(true);
    let pipeline = harness.pipeline(&test_config(&[("PUBSUB_DEAD_LETTER_TOPIC", DEAD_LETTER_TOPIC)]));

    let report = pipeline.run_batch(&request(&["rust"])).await;
    let collection = &report.collections[0];

    assert_eq!(collection.status, CollectionStatus::Completed);
    assert_eq!(collection.publish_failed, 2);
    assert_eq!(collection.archived, 2);

    let forwarded = harness.dead_letter.sent();
    assert_eq!(forwarded.len(), 2);
    assert!(forwarded.iter().all(|(topic, _)| topic == DEAD_LETTER_TOPIC));
    assert_eq!(harness.metrics.latency_count(PUBLISH_LATENCY_MS), 0);
}

#[tokio::test]
async fn test_archive_failure_does_not_block_publish() {
    let source = ScriptedSource::new().script(
        "rust",
        vec![Ok(vec![raw_item("b1", Some("bob"), "rust")])],
    );
    let mut harness = Harness::new(source);
    harness.store = MemoryStore::failing();
    let pipeline = harness.pipeline(&test_config(&[]));

    let report = pipeline.run_batch(&request(&["rust"])).await;

    assert_eq!(report.collections[0].published, 1);
    assert_eq!(report.collections[0].archive_failed, 1);
    assert_eq!(harness.metrics.counter(ARCHIVE_FAILED), 1);
    assert_eq!(harness.metrics.counter(ARCHIVE_SUCCEEDED), 0);
}

#[tokio::test(start_paused = true)]
async fn test_archive_timeout_counts_as_failure() {
    let source = ScriptedSource::new().script(
        "rust",
        vec![Ok(vec![raw_item("b1", Some("bob"), "rust")])],
    );
    let mut harness = Harness::new(source);
    harness.store = MemoryStore::stalled();
    let pipeline = harness.pipeline(&test_config(&[]));
    let started = tokio::time::Instant::now();

    let report = pipeline.run_batch(&request(&["rust"])).await;

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(report.collections[0].published, 1);
    assert_eq!(report.collections[0].archive_failed, 1);
    assert_eq!(harness.queue.sent().len(), 1);
    assert_eq!(harness.metrics.counter(ARCHIVE_FAILED), 1);
    assert_eq!(harness.metrics.counter(ARCHIVE_SUCCEEDED), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_store_yields_timeout_error() {
    let metrics = RecordingMetrics::new();
    let archiver = Archiver::new(
        MemoryStore::stalled(),
        BUCKET,
        Duration::from_secs(60),
        metrics.handle(),
    );
    let record = record("p1");
    let key = Archiver::generate_key(&record);

    let err = archiver.upload(&record, &key).await.unwrap_err();

    match err {
        ArchiveError::Store { key: failed_key, source } => {
            assert_eq!(failed_key, key.as_str());
            assert_eq!(source, StoreError::Timeout(Duration::from_secs(60)));
        },
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(metrics.counter(ARCHIVE_FAILED), 1);
}

#[tokio::test]
async fn test_panicking_collection_is_aborted() {
    let source = ScriptedSource::new()
        .panic_on("boom")
        .script("rust", vec![Ok(vec![raw_item("b1", Some("bob"), "rust")])]);
    let harness = Harness::new(source);
    let pipeline = harness.pipeline(&test_config(&[]));

    let report = pipeline.run_batch(&request(&["boom", "rust"])).await;

    let statuses: Vec<CollectionStatus> = report.collections.iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![CollectionStatus::Aborted, CollectionStatus::Completed]);
    assert_eq!(report.collections[0].collection, "boom");
    assert_eq!(report.published(), 1);
    assert_eq!(harness.queue.sent_records()[0]["id"], "b1");
}

#[tokio::test]
async fn test_shutdown_closes_both_queues() {
    let harness = Harness::new(ScriptedSource::new());
    let pipeline = harness.pipeline(&test_config(&[("PUBSUB_DEAD_LETTER_TOPIC", DEAD_LETTER_TOPIC)]));

    pipeline.shutdown().await;

    assert_eq!(harness.queue.close_count(), 1);
    assert_eq!(harness.dead_letter.close_count(), 1);
}

fn record(id: &str) -> CanonicalRecord {
    CanonicalRecord {
        id: id.to_string(),
        title: "t".to_string(),
        author: "a".to_string(),
        collection: "rust".to_string(),
        extracted_at: chrono::Utc::now(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dead_letter_success_still_raises_original_error() {
    let primary = RecordingQueue::failing();
    let dead_letter = RecordingQueue::new();
    let publisher = Publisher::new(primary.clone(), TOPIC, Duration::from_secs(60), Metrics::disabled())
        .with_dead_letter(dead_letter.clone(), DEAD_LETTER_TOPIC);

    let err = publisher.publish(&record("p1")).await.unwrap_err();

    match err {
        PublishError::Queue { topic, source } => {
            assert_eq!(topic, TOPIC);
            assert_eq!(source, QueueError::Transport("connection refused".into()));
        },
        other => panic!("unexpected error: {}", other),
    }

    let forwarded = dead_letter.sent();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].1, primary.sent()[0].1);
}

#[tokio::test]
async fn test_dead_letter_failure_is_swallowed() {
    let primary = RecordingQueue::failing();
    let dead_letter = RecordingQueue::failing();
    let publisher = Publisher::new(primary, TOPIC, Duration::from_secs(60), Metrics::disabled())
        .with_dead_letter(dead_letter.clone(), DEAD_LETTER_TOPIC);

    let err = publisher.publish(&record("p1")).await.unwrap_err();

    assert!(matches!(
        err,
        PublishError::Queue { ref topic, .. } if topic == TOPIC
    ));
    assert_eq!(dead_letter.sent().len(), 1);
}

#[tokio::test]
async fn test_publish_without_dead_letter() {
    let primary = RecordingQueue::new();
    let metrics = RecordingMetrics::new();
    let publisher = Publisher::new(primary.clone(), TOPIC, Duration::from_secs(60), metrics.handle());

    let message_id = publisher.publish(&record("p1")).await.unwrap();

    assert_eq!(message_id, "msg-0");
    assert_eq!(metrics.latency_count(PUBLISH_LATENCY_MS), 1);

    primary.set_failing(true);
    assert!(publisher.publish(&record("p2")).await.is_err());
    assert_eq!(primary.sent().len(), 2);
}

#[tokio::test]
async fn test_metrics_failures_do_not_fail_dispatch() {
    struct BrokenMetrics;

    impl forumpipe_ingest::metrics::MetricsBackend for BrokenMetrics {
        fn record_counter(&self, _name: &str, _value: u64) -> anyhow::Result<()> {
            anyhow::bail!("metrics endpoint down")
        }

        fn record_latency(&self, _name: &str, _millis: f64) -> anyhow::Result<()> {
            panic!("metrics client bug")
        }
    }

    let primary = RecordingQueue::new();
    let publisher = Publisher::new(
        primary,
        TOPIC,
        Duration::from_secs(60),
        Metrics::new(Arc::new(BrokenMetrics)),
    );

    assert!(publisher.publish(&record("p1")).await.is_ok());
}
