//! Error types for LVBridge
//!
//! Errors shared by every crate: configuration loading and daemon-reported
//! data that violates the capacity model.

use thiserror::Error;

/// Common result type for LVBridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for LVBridge
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid capacity snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid snapshot error
    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Self::InvalidSnapshot(msg.into())
    }
}
