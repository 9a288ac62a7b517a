//! Process-wide pipeline context
//!
//! Every client handle is built once at startup and owned here; the trigger
//! and the CLI both drive batches through a [`PipelineContext`].

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::archiver::Archiver;
use crate::config::{parse_collections, Config};
use crate::credentials::RedditCredentials;
use crate::error::AppError;
use crate::extractor::Extractor;
use crate::metrics::Metrics;
use crate::orchestrator::{BatchOrchestrator, BatchReport, BatchRequest};
use crate::publisher::Publisher;
use crate::queue::{MessageQueue, PubSubClient};
use crate::source::{ForumSource, RedditClient};
use crate::storage::{ObjectStore, S3Store};

/// External capabilities a context is assembled from
pub struct Capabilities {
    pub source: Arc<dyn ForumSource>,
    pub queue: Arc<dyn MessageQueue>,
    /// Only used when a dead-letter topic is configured
    pub dead_letter_queue: Option<Arc<dyn MessageQueue>>,
    pub store: Arc<dyn ObjectStore>,
}

pub struct PipelineContext {
    orchestrator: BatchOrchestrator,
    default_collections: Vec<String>,
    default_limit: u32,
}

impl PipelineContext {
    /// Load credentials and open every production client
    pub fn initialize(config: &Config, metrics: Metrics) -> anyhow::Result<Self> {
        let credentials = RedditCredentials::load(config.secret_id.as_deref())
            .context("Failed to load forum API credentials")?;
        let source = RedditClient::new(credentials, &config.forum)?;

        let queue = PubSubClient::new(
            &config.queue.endpoint,
            config.project_id.clone(),
            config.queue.access_token.clone(),
        )
        .context("Failed to create queue client")?;

        let dead_letter_queue = match &config.queue.dead_letter_topic {
            Some(_) => Some(Arc::new(
                PubSubClient::new(
                    &config.queue.endpoint,
                    config.project_id.clone(),
                    config.queue.access_token.clone(),
                )
                .context("Failed to create dead-letter queue client")?,
            ) as Arc<dyn MessageQueue>),
            None => None,
        };

        let store = S3Store::new(config.storage.clone());

        info!(
            project_id = %config.project_id,
            topic = %config.queue.topic,
            dead_letter_topic = ?config.queue.dead_letter_topic,
            bucket = %config.archive.bucket,
            "Pipeline initialized"
        );

        Ok(Self::from_parts(
            config,
            Capabilities {
                source: Arc::new(source),
                queue: Arc::new(queue),
                dead_letter_queue,
                store: Arc::new(store),
            },
            metrics,
        ))
    }

    /// Assemble a context from already-built capabilities
    pub fn from_parts(config: &Config, capabilities: Capabilities, metrics: Metrics) -> Self {
        let extractor = Extractor::new(capabilities.source, config.fetch_retry_policy(), metrics.clone());

        let mut publisher = Publisher::new(
            capabilities.queue,
            config.queue.topic.clone(),
            config.publish_timeout(),
            metrics.clone(),
        );
        if let (Some(topic), Some(queue)) = (&config.queue.dead_letter_topic, capabilities.dead_letter_queue) {
            publisher = publisher.with_dead_letter(queue, topic.clone());
        }

        let archiver = Archiver::new(
            capabilities.store,
            config.archive.bucket.clone(),
            config.archive_timeout(),
            metrics,
        );

        Self {
            orchestrator: BatchOrchestrator::new(
                extractor,
                Arc::new(publisher),
                Arc::new(archiver),
                config.batch.worker_pool_size,
            ),
            default_collections: config.batch.subreddits.clone(),
            default_limit: config.batch.post_limit,
        }
    }

    /// Fill in a trigger's optional values from the configured defaults
    pub fn resolve_request(&self, subreddits: Option<&str>, limit: Option<i64>) -> Result<BatchRequest, AppError> {
        let collections = match subreddits.map(parse_collections) {
            Some(names) if !names.is_empty() => names,
            _ => self.default_collections.clone(),
        };
        if collections.is_empty() {
            return Err(AppError::BadRequest("No subreddits to process".to_string()));
        }

        let limit = match limit {
            None => self.default_limit,
            Some(n) if n > 0 => u32::try_from(n)
                .map_err(|_| AppError::BadRequest(format!("limit is too large: {}", n)))?,
            Some(n) => {
                return Err(AppError::BadRequest(format!(
                    "limit must be a positive integer, got {}",
                    n
                )))
            },
        };

        Ok(BatchRequest { collections, limit })
    }

    pub async fn run_batch(&self, request: &BatchRequest) -> BatchReport {
        self.orchestrator.run(request).await
    }

    /// Flush and close the queue handles
    pub async fn shutdown(&self) {
        self.orchestrator.publisher().close().await;
        info!("Pipeline shut down");
    }
}
