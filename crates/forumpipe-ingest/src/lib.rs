//! Forumpipe ingestion job
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetches hot posts from a list of subreddits, validates them, and fans each
//! valid post out to a Pub/Sub topic and an S3-compatible archive.
//!
//! # Pipeline
//!
//! - [`extractor::Extractor`] fetches one collection with a fixed-delay retry
//!   and normalizes raw items into [`forumpipe_common::types::CanonicalRecord`]s
//! - [`validator::validate`] drops records missing a required field
//! - [`publisher::Publisher`] sends to the primary topic, forwarding failures
//!   to an optional dead-letter topic
//! - [`archiver::Archiver`] writes pretty-printed JSON under a date-partitioned key
//! - [`orchestrator::BatchOrchestrator`] drives collections one at a time and
//!   dispatches records on a bounded [`pool::WorkerPool`]
//!
//! External systems sit behind the [`source::ForumSource`],
//! [`queue::MessageQueue`], [`storage::ObjectStore`] and
//! [`metrics::MetricsBackend`] traits.
//!
//! # Example
//!
//! ```no_run
//! use forumpipe_ingest::{config::Config, context::PipelineContext, metrics::Metrics};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = PipelineContext::initialize(&config, Metrics::disabled())?;
//!     let request = pipeline.resolve_request(Some("rust;golang"), Some(10))?;
//!     let report = pipeline.run_batch(&request).await;
//!     println!("{} collections completed", report.completed());
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod archiver;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod publisher;
pub mod queue;
pub mod retry;
pub mod server;
pub mod source;
pub mod storage;
pub mod validator;

// Re-export commonly used types
pub use context::PipelineContext;
pub use error::AppError;
pub use orchestrator::{BatchOrchestrator, BatchReport, BatchRequest};
