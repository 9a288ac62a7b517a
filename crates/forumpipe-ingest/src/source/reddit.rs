//! Reddit API client
//!
//! Uses application-only OAuth (client credentials grant). The bearer token
//! is cached and refreshed shortly before it expires.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{ForumSource, RawItem};
use crate::config::ForumConfig;
use crate::credentials::RedditCredentials;
use crate::error::FetchError;

/// Per-request timeout for the forum API
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh the token this long before the API says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Largest page the listing endpoint serves
const MAX_LISTING_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawItem,
}

/// Read-only client for subreddit listings
pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    auth_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials, config: &ForumConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        info!(api_url = %config.api_url, "Reddit client created (read-only)");

        Ok(Self {
            http,
            credentials,
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting new Reddit access token");

        let response = self
            .http
            .post(format!("{}/api/v1/access_token", self.auth_url))
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(classify_transport)?;

        let response = check_status(response, "access token").await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("token response: {}", e)))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = body.access_token;
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl ForumSource for RedditClient {
    async fn fetch_top(&self, collection: &str, limit: u32) -> Result<Vec<RawItem>, FetchError> {
        validate_collection_name(collection)?;

        let token = self.bearer_token().await?;
        let limit = limit.clamp(1, MAX_LISTING_LIMIT);

        let response = self
            .http
            .get(format!("{}/r/{}/hot", self.api_url, collection))
            .bearer_auth(token)
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(classify_transport)?;

        let response = match check_status(response, collection).await {
            Err(e @ FetchError::Auth(_)) => {
                self.forget_token().await;
                return Err(e);
            },
            other => other?,
        };

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("listing for r/{}: {}", collection, e)))?;

        let mut items: Vec<RawItem> = listing.data.children.into_iter().map(|c| c.data).collect();
        items.truncate(limit as usize);

        debug!(collection, count = items.len(), "Fetched listing");

        Ok(items)
    }
}

/// Subreddit names are ASCII letters, digits and underscores
fn validate_collection_name(name: &str) -> Result<(), FetchError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FetchError::InvalidCollection(name.to_string()));
    }
    Ok(())
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} returned {}: {}", what, status, body.trim());

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => FetchError::Transient(detail),
        s if s.is_server_error() => FetchError::Transient(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(detail),
        StatusCode::NOT_FOUND => FetchError::NotFound(detail),
        _ => FetchError::Other(detail),
    })
}
