//! Google Cloud Pub/Sub over its REST API

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument};

use super::MessageQueue;
use crate::error::QueueError;

#[derive(Serialize)]
struct PublishRequest {
    messages: Vec<PubsubMessage>,
}

#[derive(Serialize)]
struct PubsubMessage {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publisher client for one project's topics
pub struct PubSubClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    access_token: Option<String>,
    in_flight: TaskTracker,
}

impl PubSubClient {
    pub fn new(
        endpoint: &str,
        project_id: impl Into<String>,
        access_token: Option<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, endpoint, project_id, access_token))
    }

    pub fn with_http(
        http: reqwest::Client,
        endpoint: &str,
        project_id: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let project_id = project_id.into();
        info!(endpoint, project_id = %project_id, "Pub/Sub client created");

        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id,
            access_token,
            in_flight: TaskTracker::new(),
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}:publish",
            self.endpoint, self.project_id, topic
        )
    }

    async fn publish_once(&self, topic: &str, payload: Vec<u8>) -> Result<String, QueueError> {
        let body = PublishRequest {
            messages: vec![PubsubMessage {
                data: base64::engine::general_purpose::STANDARD.encode(payload),
            }],
        };

        let mut request = self.http.post(self.topic_url(topic)).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let decoded: PublishResponse = response
            .json()
            .await
            .map_err(|e| QueueError::Transport(format!("invalid publish response: {}", e)))?;

        decoded
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Transport("publish response carried no message id".into()))
    }
}

#[async_trait]
impl MessageQueue for PubSubClient {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, QueueError> {
        if self.in_flight.is_closed() {
            return Err(QueueError::Closed);
        }

        let message_id = self.in_flight.track_future(self.publish_once(topic, payload)).await?;
        debug!(topic, message_id = %message_id, "Message published");
        Ok(message_id)
    }

    async fn close(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        debug!(project_id = %self.project_id, "Pub/Sub client closed");
    }
}
