//! Common types used across forumpipe

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author value used when the forum reports the author as absent or deleted.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// A normalized forum post, the unit of work of the pipeline.
///
/// Field names on the wire follow the forum's own vocabulary (`selftext`,
/// `subreddit`, `created_utc`) so downstream consumers of the queue and the
/// archive see the same shape. Timestamps serialize as RFC 3339 text.
///
/// `created_at` is optional only so that a source item without a creation
/// time can still be represented and then rejected by validation; records
/// that reach the sinks always carry it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub title: String,
    pub score: i64,
    pub num_comments: i64,
    pub author: String,
    #[serde(rename = "created_utc")]
    pub created_at: Option<DateTime<Utc>>,
    pub url: String,
    #[serde(rename = "selftext")]
    pub body: String,
    #[serde(rename = "subreddit")]
    pub collection: String,
    #[serde(rename = "extraction_timestamp")]
    pub extracted_at: DateTime<Utc>,
    #[serde(rename = "processing_timestamp")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    /// Stamp the dispatch time. Called once, right before fan-out.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed_at = Some(at);
    }
}
