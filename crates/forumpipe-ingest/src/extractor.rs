//! Extraction: fetch a collection's hot items and normalize them
//!
//! The retry policy wraps only the bare fetch call. Normalization is a pure
//! function of the raw item and the extraction time.

use chrono::{DateTime, Utc};
use forumpipe_common::types::{CanonicalRecord, DELETED_AUTHOR};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::error::FetchError;
use crate::metrics::{Metrics, POSTS_EXTRACTED};
use crate::retry::RetryPolicy;
use crate::source::{ForumSource, RawItem};

/// Fetches and normalizes posts from one collection at a time
pub struct Extractor {
    source: Arc<dyn ForumSource>,
    retry: RetryPolicy,
    metrics: Metrics,
    clock: ExtractionClock,
}

impl Extractor {
    pub fn new(source: Arc<dyn ForumSource>, retry: RetryPolicy, metrics: Metrics) -> Self {
        Self {
            source,
            retry,
            metrics,
            clock: ExtractionClock::default(),
        }
    }

    /// Fetch up to `limit` hot posts from `collection`.
    ///
    /// Transient failures are retried per the policy; the last failure, or
    /// any non-transient one, is returned to the caller.
    #[instrument(skip(self))]
    pub async fn extract(&self, collection: &str, limit: u32) -> Result<Vec<CanonicalRecord>, FetchError> {
        let items = self
            .retry
            .run(
                "fetch_top",
                |attempt| {
                    info!(collection, attempt, "Fetching hot posts");
                    self.source.fetch_top(collection, limit)
                },
                FetchError::is_transient,
            )
            .await?;

        self.metrics.record_counter(POSTS_EXTRACTED, items.len() as u64);
        info!(collection, count = items.len(), "Extracted posts");

        Ok(items
            .into_iter()
            .map(|item| format_item(item, self.clock.now()))
            .collect())
    }
}

/// Map one raw item to the canonical record shape.
///
/// Absent strings become empty strings (validation decides whether that is
/// acceptable); an absent author becomes [`DELETED_AUTHOR`].
pub fn format_item(item: RawItem, extracted_at: DateTime<Utc>) -> CanonicalRecord {
    CanonicalRecord {
        id: item.id.unwrap_or_default(),
        title: item.title.unwrap_or_default(),
        score: item.score,
        num_comments: item.num_comments,
        author: item.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        created_at: item.created_utc.and_then(epoch_to_utc),
        url: item.url.unwrap_or_default(),
        body: item.selftext.unwrap_or_default(),
        collection: item.subreddit.unwrap_or_default(),
        extracted_at,
        processed_at: None,
    }
}

fn epoch_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Wall clock that never runs backwards within the process
#[derive(Debug, Default)]
struct ExtractionClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ExtractionClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last.lock() {
            Ok(mut last) => {
                let stamp = match *last {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                *last = Some(stamp);
                stamp
            },
            // A poisoned lock only means another thread panicked mid-update
            Err(poisoned) => {
                let mut last = poisoned.into_inner();
                let stamp = last.map_or(now, |previous| previous.max(now));
                *last = Some(stamp);
                stamp
            },
        }
    }
}
