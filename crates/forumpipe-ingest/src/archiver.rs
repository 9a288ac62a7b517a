//! Raw retention of records in the object store
//!
//! Records land under date-partitioned keys derived from the post id and the
//! extraction time, so re-archiving the same extraction overwrites in place.

use forumpipe_common::types::CanonicalRecord;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::error::{ArchiveError, StoreError};
use crate::metrics::{Metrics, ARCHIVE_FAILED, ARCHIVE_SUCCEEDED};
use crate::storage::{ObjectStore, UploadResult};

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Object key of an archived record: `YYYY/MM/DD/post_<id>_<YYYYMMDDTHHMMSS>.json`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    timeout: Duration,
    metrics: Metrics,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            timeout,
            metrics,
        }
    }

    pub fn generate_key(record: &CanonicalRecord) -> StorageKey {
        let at = record.extracted_at;
        StorageKey(format!(
            "{}/post_{}_{}.json",
            at.format("%Y/%m/%d"),
            record.id,
            at.format("%Y%m%dT%H%M%S")
        ))
    }

    /// Write the record as pretty-printed JSON under `key`.
    ///
    /// Both outcomes are counted before returning.
    #[instrument(skip_all, fields(post_id = %record.id, key = %key))]
    pub async fn upload(&self, record: &CanonicalRecord, key: &StorageKey) -> Result<UploadResult, ArchiveError> {
        let result = self.write(record, key).await;

        match &result {
            Ok(upload) => {
                self.metrics.record_counter(ARCHIVE_SUCCEEDED, 1);
                info!(bucket = %self.bucket, size = upload.size, "Archived post");
            },
            Err(e) => {
                self.metrics.record_counter(ARCHIVE_FAILED, 1);
                error!(bucket = %self.bucket, error = %e, "Failed to archive post");
            },
        }

        result
    }

    async fn write(&self, record: &CanonicalRecord, key: &StorageKey) -> Result<UploadResult, ArchiveError> {
        let bytes = serde_json::to_vec_pretty(record)?;

        let write = self.store.write(&self.bucket, key.as_str(), bytes, CONTENT_TYPE_JSON);
        let outcome = match tokio::time::timeout(self.timeout, write).await {
            Ok(outcome) => outcome,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        outcome.map_err(|source| ArchiveError::Store {
            key: key.to_string(),
            source,
        })
    }
}
