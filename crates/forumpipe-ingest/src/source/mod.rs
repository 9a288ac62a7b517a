//! Forum API capability
//!
//! The extractor only needs "give me the top N items of this collection";
//! [`ForumSource`] is that seam and [`reddit::RedditClient`] the production
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;

pub mod reddit;

pub use reddit::RedditClient;

/// One item as returned by the forum API. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub score: i64,
    pub num_comments: i64,
    /// `None` when the account was deleted
    pub author: Option<String>,
    /// Seconds since the Unix epoch
    pub created_utc: Option<f64>,
    pub url: Option<String>,
    pub selftext: Option<String>,
    pub subreddit: Option<String>,
}

/// Fetch the top-ranked items of a named collection
#[async_trait]
pub trait ForumSource: Send + Sync {
    /// Fetch at most `limit` items ordered by the forum's "hot" ranking.
    ///
    /// Retryable conditions are reported as [`FetchError::Transient`].
    async fn fetch_top(&self, collection: &str, limit: u32) -> Result<Vec<RawItem>, FetchError>;
}
