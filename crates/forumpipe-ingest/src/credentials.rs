//! Forum API credentials
//!
//! Resolved once at startup, either from a JSON secret document (the path in
//! `SECRET_ID`, typically a mounted secret volume) or from the
//! `REDDIT_CLIENT_ID` / `REDDIT_CLIENT_SECRET` / `REDDIT_USER_AGENT`
//! environment variables. Any failure here is fatal to the process.

use forumpipe_common::{ForumpipeError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

const MISSING_CREDENTIALS: &str = "Missing Reddit credentials.";

/// Application-only OAuth credentials for the forum API
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RedditCredentials {
    /// Load from the secret document when one is configured, else the environment
    pub fn load(secret_id: Option<&str>) -> Result<Self> {
        match secret_id {
            Some(path) => {
                info!(secret = path, "Loading Reddit credentials from secret document");
                Self::from_secret_file(path)
            },
            None => {
                info!("Loading Reddit credentials from environment");
                Self::from_lookup(|key| std::env::var(key).ok())
            },
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match (
            value("REDDIT_CLIENT_ID"),
            value("REDDIT_CLIENT_SECRET"),
            value("REDDIT_USER_AGENT"),
        ) {
            (Some(client_id), Some(client_secret), Some(user_agent)) => Ok(Self {
                client_id,
                client_secret,
                user_agent,
            }),
            _ => Err(ForumpipeError::Credentials(MISSING_CREDENTIALS.to_string())),
        }
    }

    pub fn from_secret_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let credentials: RedditCredentials = serde_json::from_str(raw)?;
        if credentials.client_id.trim().is_empty()
            || credentials.client_secret.trim().is_empty()
            || credentials.user_agent.trim().is_empty()
        {
            return Err(ForumpipeError::Credentials(MISSING_CREDENTIALS.to_string()));
        }
        Ok(credentials)
    }
}
