//! Error types for the ingestion job
//!
//! One enum per seam: the forum API (`FetchError`), the queue (`QueueError`),
//! the object store (`StoreError`), the two sinks built on them
//! (`PublishError`, `ArchiveError`), the dispatch tasks (`DispatchError`),
//! and the trigger surface (`AppError`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failure while fetching items from the forum API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network trouble, rate limiting, or a 5xx from the API
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Collection not found: {0}")]
    NotFound(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Only transient failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Failure reported by a message queue client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Send was not confirmed within {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Queue rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Queue client is closed")]
    Closed,
}

/// Failure reported by an object store client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Object store error: {0}")]
    Backend(String),
}

/// Failure publishing a record to the primary queue
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish to {topic}: {source}")]
    Queue {
        topic: String,
        #[source]
        source: QueueError,
    },
}

/// Failure archiving a record
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Failure of one dispatch task
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Errors surfaced by the HTTP trigger
#[derive(Error, Debug)]
pub enum AppError {
    /// Startup initialisation failed; every trigger is refused
    #[error("Service not initialized: {0}")]
    NotInitialized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotInitialized(ref message) => {
                tracing::error!(severity = "CRITICAL", "Trigger refused, service not initialized: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Service not initialized".to_string())
            },
            AppError::BadRequest(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!(severity = "CRITICAL", "Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
        };

        let body = Json(json!({
            "status": "error",
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
