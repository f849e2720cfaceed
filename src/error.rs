//! Error types for Skiff

use thiserror::Error;

/// Result type alias using Skiff's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Skiff
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cloud provider API error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Memory store error
    #[error("Memory error: {0}")]
    Memory(String),

    /// File could not be parsed: unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File content extraction failed
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
