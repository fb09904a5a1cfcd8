//! Error types for the Sdkguard crate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Sdkguard operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiter settings that cannot produce a working limiter
    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// The request was suppressed by the client-side rate limiter
    #[error("Rate limited: request to {endpoint} suppressed (retry after {retry_after:?})")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },

    /// Errors raised by the underlying transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SdkError {
    fn from(err: config::ConfigError) -> Self {
        SdkError::Config(err.to_string())
    }
}

/// Result type alias for Sdkguard operations.
pub type Result<T> = std::result::Result<T, SdkError>;
