//! Error types for forumpipe

use thiserror::Error;

/// Result type alias for forumpipe operations
pub type Result<T> = std::result::Result<T, ForumpipeError>;

/// Errors shared by every forumpipe crate
#[derive(Error, Debug)]
pub enum ForumpipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl ForumpipeError {
    /// Build a configuration error for a missing required option
    pub fn missing_option(name: &str) -> Self {
        ForumpipeError::Config(format!("missing required option {}", name))
    }
}
