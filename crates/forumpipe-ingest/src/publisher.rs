//! Publishing records to the primary queue
//!
//! A failed publish is forwarded once to the dead-letter topic when one is
//! configured. The forward is best effort: its own failure is logged and
//! swallowed, and the caller always sees the primary failure.

use forumpipe_common::types::CanonicalRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PublishError, QueueError};
use crate::metrics::{Metrics, PUBLISH_LATENCY_MS};
use crate::queue::MessageQueue;

struct DeadLetter {
    queue: Arc<dyn MessageQueue>,
    topic: String,
}

pub struct Publisher {
    queue: Arc<dyn MessageQueue>,
    topic: String,
    dead_letter: Option<DeadLetter>,
    timeout: Duration,
    metrics: Metrics,
}

impl Publisher {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        topic: impl Into<String>,
        timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            queue,
            topic: topic.into(),
            dead_letter: None,
            timeout,
            metrics,
        }
    }

    /// Forward failed publishes to `topic` on `queue`
    pub fn with_dead_letter(mut self, queue: Arc<dyn MessageQueue>, topic: impl Into<String>) -> Self {
        self.dead_letter = Some(DeadLetter {
            queue,
            topic: topic.into(),
        });
        self
    }

    /// Publish one record and return its message id
    #[instrument(skip_all, fields(post_id = %record.id, topic = %self.topic))]
    pub async fn publish(&self, record: &CanonicalRecord) -> Result<String, PublishError> {
        let payload = serde_json::to_vec(record)?;
        let retained = self.dead_letter.as_ref().map(|_| payload.clone());

        let started = Instant::now();
        match send_within(self.queue.as_ref(), &self.topic, payload, self.timeout).await {
            Ok(message_id) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics.record_latency(PUBLISH_LATENCY_MS, latency_ms);
                info!(message_id = %message_id, latency_ms, "Published post");
                Ok(message_id)
            },
            Err(source) => {
                error!(error = %source, "Failed to publish post");
                if let Some(payload) = retained {
                    self.forward_to_dead_letter(&record.id, payload).await;
                }
                Err(PublishError::Queue {
                    topic: self.topic.clone(),
                    source,
                })
            },
        }
    }

    async fn forward_to_dead_letter(&self, post_id: &str, payload: Vec<u8>) {
        let Some(dead_letter) = &self.dead_letter else {
            return;
        };

        match send_within(dead_letter.queue.as_ref(), &dead_letter.topic, payload, self.timeout).await {
            Ok(message_id) => warn!(
                post_id,
                dead_letter_topic = %dead_letter.topic,
                message_id = %message_id,
                "Forwarded post to dead-letter topic"
            ),
            Err(e) => error!(
                severity = "CRITICAL",
                post_id,
                dead_letter_topic = %dead_letter.topic,
                error = %e,
                "Failed to forward post to dead-letter topic"
            ),
        }
    }

    /// Close the primary and dead-letter handles, waiting for in-flight sends
    pub async fn close(&self) {
        self.queue.close().await;
        if let Some(dead_letter) = &self.dead_letter {
            dead_letter.queue.close().await;
        }
        debug!(topic = %self.topic, "Publisher closed");
    }
}

async fn send_within(
    queue: &dyn MessageQueue,
    topic: &str,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<String, QueueError> {
    match tokio::time::timeout(timeout, queue.send(topic, payload)).await {
        Ok(result) => result,
        Err(_) => Err(QueueError::Timeout(timeout)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StalledQueue;

    #[async_trait]
    impl MessageQueue for StalledQueue {
        async fn send(&self, _topic: &str, _payload: Vec<u8>) -> Result<String, QueueError> {
            std::future::pending().await
        }

        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_times_out() {
        let publisher = Publisher::new(
            Arc::new(StalledQueue),
            "reddit-posts",
            Duration::from_secs(60),
            Metrics::disabled(),
        );
        let record = CanonicalRecord {
            id: "abc".into(),
            extracted_at: Utc::now(),
            ..Default::default()
        };

        let err = publisher.publish(&record).await.unwrap_err();
        match err {
            PublishError::Queue { topic, source } => {
                assert_eq!(topic, "reddit-posts");
                assert_eq!(source, QueueError::Timeout(Duration::from_secs(60)));
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
