//! Centralized error types for Taskpulse.

use thiserror::Error;

/// Main error type for fan-out operations.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected")]
    NotConnected,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publish rejected with status {0}")]
    PublishRejected(u16),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for fan-out operations.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
