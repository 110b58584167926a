//! Custom error types for gateway operations

use thiserror::Error;

/// Gateway-related errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller supplied an empty prompt
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// Upstream API request failed
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Network error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// Request timeout
    #[error("Request timeout")]
    TimeoutError,

    /// Invalid response from API
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Persistent store error
    #[error("Store error: {message}")]
    StoreError {
        message: String,
    },

    /// Wrapper for anyhow errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::InternalError(err.to_string())
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
