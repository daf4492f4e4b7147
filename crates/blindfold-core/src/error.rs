//! Error types for the Blindfold scrubbing pipeline.
//!
//! Scrubbing failures form a closed set, one variant per pipeline stage, so
//! every fallible boundary is visible in the signature of the stage that can
//! fail. Configuration and I/O errors sit one level up in [`BlindfoldError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Blindfold operations.
#[derive(Error, Debug)]
pub enum BlindfoldError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A pipeline stage failed
    #[error("Scrub error: {0}")]
    Scrub(#[from] ScrubError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Failure of one stage of the single-image pipeline.
///
/// Serializable so that process workers can hand the exact variant back to
/// the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ScrubError {
    /// The buffer is empty, truncated, oversized, or not a recognized image.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Decoding or re-encoding while removing metadata failed.
    #[error("Metadata removal failed: {0}")]
    MetadataStripFailure(String),

    /// The classifier asset is unavailable or detection internals failed.
    ///
    /// Finding zero faces is not an error.
    #[error("Face detection failed: {0}")]
    DetectionFailure(String),
}

impl ScrubError {
    /// Short name of the stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            ScrubError::InvalidImage(_) => "validate",
            ScrubError::MetadataStripFailure(_) => "strip",
            ScrubError::DetectionFailure(_) => "detect",
        }
    }
}

/// Failure of a bulk worker while handling one item.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The item itself failed inside the pipeline
    #[error(transparent)]
    Scrub(#[from] ScrubError),

    /// The channel to a worker process broke
    #[error("Worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A worker sent or received something that is not a valid frame
    #[error("Worker protocol violation: {0}")]
    Protocol(String),

    /// The pipeline panicked while handling the item
    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Whether the worker can keep taking items after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WorkerError::Scrub(_) | WorkerError::Panicked(_))
    }
}

/// Convenience type alias for Blindfold results.
pub type Result<T> = std::result::Result<T, BlindfoldError>;

/// Convenience type alias for pipeline-stage results.
pub type ScrubResult<T> = std::result::Result<T, ScrubError>;
