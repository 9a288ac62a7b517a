//! Configuration management
//!
//! Everything is read from the environment (after loading `.env` if present).
//! `Config::from_lookup` accepts any key lookup so tests never touch the
//! process environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::storage::config::StorageConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Default semicolon-delimited collection list.
pub const DEFAULT_SUBREDDITS: &str = "dataengineering;rust;programming";

/// Default number of posts fetched per collection.
pub const DEFAULT_POST_LIMIT: u32 = 15;

/// Default number of concurrent dispatch tasks per collection.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

/// Default bound on waiting for a publish confirmation.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 60;

/// Default bound on an archive write.
pub const DEFAULT_ARCHIVE_TIMEOUT_SECS: u64 = 60;

/// Default number of fetch attempts per collection.
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between fetch attempts.
pub const DEFAULT_FETCH_RETRY_DELAY_SECS: u64 = 5;

pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_REDDIT_AUTH_URL: &str = "https://www.reddit.com";
pub const DEFAULT_REDDIT_API_URL: &str = "https://oauth.reddit.com";

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project_id: String,
    /// Path of a JSON secret document with the forum API credentials
    pub secret_id: Option<String>,
    pub queue: QueueConfig,
    pub archive: ArchiveConfig,
    pub batch: BatchConfig,
    pub forum: ForumConfig,
    pub storage: StorageConfig,
}

/// Message queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub topic: String,
    /// DLQ forwarding is disabled when absent
    pub dead_letter_topic: Option<String>,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub publish_timeout_secs: u64,
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub bucket: String,
    pub timeout_secs: u64,
}

/// Batch defaults and orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub subreddits: Vec<String>,
    pub post_limit: u32,
    pub worker_pool_size: usize,
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay_secs: u64,
}

/// Forum API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub auth_url: String,
    pub api_url: String,
}

/// Trigger server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| forumpipe_common::ForumpipeError::missing_option(key).into())
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str, default| parse_or(optional(key), key, default);

        let config = Config {
            project_id: required("PROJECT_ID")?,
            secret_id: optional("SECRET_ID"),
            queue: QueueConfig {
                topic: required("PUBSUB_TOPIC")?,
                dead_letter_topic: optional("PUBSUB_DEAD_LETTER_TOPIC"),
                endpoint: optional("PUBSUB_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_PUBSUB_ENDPOINT.to_string()),
                access_token: optional("PUBSUB_ACCESS_TOKEN"),
                publish_timeout_secs: parsed("PUBLISH_TIMEOUT_SECS", DEFAULT_PUBLISH_TIMEOUT_SECS)?,
            },
            archive: ArchiveConfig {
                bucket: required("ARCHIVE_BUCKET")?,
                timeout_secs: parsed("ARCHIVE_TIMEOUT_SECS", DEFAULT_ARCHIVE_TIMEOUT_SECS)?,
            },
            batch: BatchConfig {
                subreddits: parse_collections(
                    &optional("SUBREDDITS").unwrap_or_else(|| DEFAULT_SUBREDDITS.to_string()),
                ),
                post_limit: parse_or(optional("POST_LIMIT"), "POST_LIMIT", DEFAULT_POST_LIMIT)?,
                worker_pool_size: parse_or(
                    optional("WORKER_POOL_SIZE"),
                    "WORKER_POOL_SIZE",
                    DEFAULT_WORKER_POOL_SIZE,
                )?,
                fetch_max_attempts: parse_or(
                    optional("FETCH_MAX_ATTEMPTS"),
                    "FETCH_MAX_ATTEMPTS",
                    DEFAULT_FETCH_MAX_ATTEMPTS,
                )?,
                fetch_retry_delay_secs: parsed(
                    "FETCH_RETRY_DELAY_SECS",
                    DEFAULT_FETCH_RETRY_DELAY_SECS,
                )?,
            },
            forum: ForumConfig {
                auth_url: optional("REDDIT_AUTH_URL")
                    .unwrap_or_else(|| DEFAULT_REDDIT_AUTH_URL.to_string()),
                api_url: optional("REDDIT_API_URL")
                    .unwrap_or_else(|| DEFAULT_REDDIT_API_URL.to_string()),
            },
            storage: StorageConfig::from_lookup(&lookup),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project_id.trim().is_empty() {
            anyhow::bail!("PROJECT_ID cannot be empty");
        }

        if self.queue.topic.trim().is_empty() {
            anyhow::bail!("PUBSUB_TOPIC cannot be empty");
        }

        if self.queue.dead_letter_topic.as_deref() == Some(self.queue.topic.as_str()) {
            anyhow::bail!("PUBSUB_DEAD_LETTER_TOPIC must differ from PUBSUB_TOPIC");
        }

        if self.archive.bucket.trim().is_empty() {
            anyhow::bail!("ARCHIVE_BUCKET cannot be empty");
        }

        if self.batch.post_limit == 0 {
            anyhow::bail!("POST_LIMIT must be greater than 0");
        }

        if self.batch.worker_pool_size == 0 {
            anyhow::bail!("WORKER_POOL_SIZE must be greater than 0");
        }

        if self.batch.fetch_max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be greater than 0");
        }

        if self.batch.subreddits.is_empty() {
            tracing::warn!("No default subreddits configured - triggers must name them explicitly");
        }

        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.publish_timeout_secs)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive.timeout_secs)
    }

    pub fn fetch_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.batch.fetch_max_attempts,
            Duration::from_secs(self.batch.fetch_retry_delay_secs),
        )
    }
}

impl ServerConfig {
    /// Server settings never fail to load so the trigger can still answer
    /// (with 500) when the job configuration is broken.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Upper bound on waiting for running batches at shutdown
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("FORUMPIPE_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
            port: lookup("FORUMPIPE_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SERVER_PORT),
            shutdown_timeout_secs: lookup("FORUMPIPE_SHUTDOWN_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

/// Split a semicolon-delimited collection list, dropping blanks
pub fn parse_collections(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
