//! Crate-wide error type
//!
//! Every fallible operation of the loader returns `StreamResult`. Per-item
//! failures inside the worker are logged and contained; only initialisation
//! errors (missing or corrupt metadata, bad configuration) reach the caller.

use std::path::PathBuf;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors produced by the codec, the octree index and the loader
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset not found: {metadata} - {particles}")]
    DatasetNotFound { metadata: PathBuf, particles: PathBuf },

    #[error("Corrupted metadata: {0}")]
    CorruptedMetadata(String),

    #[error("Invalid record layout: {0}")]
    InvalidLayout(String),

    #[error("Unsupported data version: {0}")]
    UnsupportedVersion(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System error in {component}: {error}")]
    System { component: String, error: String },
}

impl From<toml::de::Error> for StreamError {
    fn from(err: toml::de::Error) -> Self {
        StreamError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Config(err.to_string())
    }
}

/// Create a corrupted metadata error
pub fn corrupted_metadata(reason: impl Into<String>) -> StreamError {
    StreamError::CorruptedMetadata(reason.into())
}

/// Create an invalid layout error
pub fn invalid_layout(reason: impl Into<String>) -> StreamError {
    StreamError::InvalidLayout(reason.into())
}
