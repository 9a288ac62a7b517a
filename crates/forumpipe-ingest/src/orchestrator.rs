// Batch orchestration
//
// Collections are processed one after another. Within a collection every
// valid record fans out to a publish task and an archive task on a bounded
// worker pool, and the collection is finished once every task has settled.
// Failures are contained at the level they happen: a collection that cannot
// be extracted is skipped, an invalid record is dropped, a failed task is
// logged and counted.

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archiver::Archiver;
use crate::error::DispatchError;
use crate::extractor::Extractor;
use crate::pool::{TaskOutcome, WorkerPool};
use crate::publisher::Publisher;
use crate::validator;

/// What one batch should process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRequest {
    pub collections: Vec<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Extraction succeeded; individual dispatch failures do not change this
    Completed,
    ExtractionFailed,
    /// Processing panicked part-way through
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub status: CollectionStatus,
    pub extracted: usize,
    pub dropped: usize,
    pub published: usize,
    pub publish_failed: usize,
    pub archived: usize,
    pub archive_failed: usize,
}

impl CollectionReport {
    fn new(collection: &str, status: CollectionStatus) -> Self {
        Self {
            collection: collection.to_string(),
            status,
            extracted: 0,
            dropped: 0,
            published: 0,
            publish_failed: 0,
            archived: 0,
            archive_failed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub collections: Vec<CollectionReport>,
    pub duration_seconds: f64,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.collections
            .iter()
            .filter(|c| c.status == CollectionStatus::Completed)
            .count()
    }

    pub fn dropped(&self) -> usize {
        self.collections.iter().map(|c| c.dropped).sum()
    }

    pub fn published(&self) -> usize {
        self.collections.iter().map(|c| c.published).sum()
    }

    pub fn archived(&self) -> usize {
        self.collections.iter().map(|c| c.archived).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchKind {
    Publish,
    Archive,
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchKind::Publish => f.write_str("publish"),
            DispatchKind::Archive => f.write_str("archive"),
        }
    }
}

type DispatchLabel = (DispatchKind, String);
type DispatchPool = WorkerPool<DispatchLabel, Result<String, DispatchError>>;

pub struct BatchOrchestrator {
    extractor: Extractor,
    publisher: Arc<Publisher>,
    archiver: Arc<Archiver>,
    pool_size: usize,
}

impl BatchOrchestrator {
    pub fn new(extractor: Extractor, publisher: Arc<Publisher>, archiver: Arc<Archiver>, pool_size: usize) -> Self {
        Self {
            extractor,
            publisher,
            archiver,
            pool_size,
        }
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Run one batch to completion. Never fails as a whole.
    pub async fn run(&self, request: &BatchRequest) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let start_time = Instant::now();

        info!(
            %batch_id,
            collections = ?request.collections,
            limit = request.limit,
            "Starting batch"
        );

        let mut collections = Vec::with_capacity(request.collections.len());
        for (index, collection) in request.collections.iter().enumerate() {
            info!(
                %batch_id,
                collection = %collection,
                "Processing collection ({} / {})",
                index + 1,
                request.collections.len()
            );

            let processed = AssertUnwindSafe(self.process_collection(collection, request.limit))
                .catch_unwind()
                .await;

            let report = match processed {
                Ok(report) => report,
                Err(_) => {
                    error!(
                        severity = "CRITICAL",
                        %batch_id,
                        collection = %collection,
                        "Collection processing panicked"
                    );
                    CollectionReport::new(collection, CollectionStatus::Aborted)
                },
            };
            collections.push(report);
        }

        let report = BatchReport {
            batch_id,
            collections,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        };

        info!(
            %batch_id,
            completed = report.completed(),
            total = report.collections.len(),
            published = report.published(),
            archived = report.archived(),
            dropped = report.dropped(),
            "Batch finished in {:.2}s",
            report.duration_seconds
        );

        report
    }

    async fn process_collection(&self, collection: &str, limit: u32) -> CollectionReport {
        let records = match self.extractor.extract(collection, limit).await {
            Ok(records) => records,
            Err(e) => {
                error!(severity = "CRITICAL", collection, error = %e, "Extraction failed");
                return CollectionReport::new(collection, CollectionStatus::ExtractionFailed);
            },
        };

        let mut report = CollectionReport::new(collection, CollectionStatus::Completed);
        report.extracted = records.len();

        let mut pool: DispatchPool = WorkerPool::new(self.pool_size);
        for mut record in records {
            if let Err(rejection) = validator::validate(&record) {
                warn!(collection, post_id = %record.id, reason = %rejection, "Dropping invalid post");
                report.dropped += 1;
                continue;
            }

            record.mark_processed(Utc::now());
            let record = Arc::new(record);
            let post_id = record.id.clone();

            let publisher = Arc::clone(&self.publisher);
            let to_publish = Arc::clone(&record);
            pool.submit((DispatchKind::Publish, post_id.clone()), async move {
                publisher.publish(&to_publish).await.map_err(DispatchError::from)
            });

            let archiver = Arc::clone(&self.archiver);
            pool.submit((DispatchKind::Archive, post_id), async move {
                let key = Archiver::generate_key(&record);
                archiver
                    .upload(&record, &key)
                    .await
                    .map(|upload| upload.key)
                    .map_err(DispatchError::from)
            });
        }

        for outcome in pool.join_all().await {
            tally(&mut report, outcome);
        }

        info!(
            collection,
            extracted = report.extracted,
            dropped = report.dropped,
            published = report.published,
            publish_failed = report.publish_failed,
            archived = report.archived,
            archive_failed = report.archive_failed,
            "Collection completed"
        );

        report
    }
}

fn tally(report: &mut CollectionReport, outcome: TaskOutcome<DispatchLabel, Result<String, DispatchError>>) {
    let (kind, post_id) = outcome.label;
    let succeeded = match outcome.result {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            error!(task = %kind, post_id = %post_id, error = %e, "Dispatch task failed");
            false
        },
        Err(e) => {
            error!(task = %kind, post_id = %post_id, error = %e, "Dispatch task did not finish");
            false
        },
    };

    match (kind, succeeded) {
        (DispatchKind::Publish, true) => report.published += 1,
        (DispatchKind::Publish, false) => report.publish_failed += 1,
        (DispatchKind::Archive, true) => report.archived += 1,
        (DispatchKind::Archive, false) => report.archive_failed += 1,
    }
}
