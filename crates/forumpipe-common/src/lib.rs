//! Forumpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the forumpipe workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ForumpipeError`] and the [`Result`] alias
//! - **Logging**: structured `tracing` setup driven by [`logging::LogConfig`]
//! - **Types**: the [`types::CanonicalRecord`] that flows through the pipeline
//!
//! # Example
//!
//! ```no_run
//! use forumpipe_common::logging::{init_logging, LogConfig};
//! use forumpipe_common::types::CanonicalRecord;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let record = CanonicalRecord::default();
//!     tracing::info!(post_id = %record.id, "Record ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ForumpipeError, Result};
