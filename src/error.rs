//! Error types for TrendSpotter
//!
//! Defines the crate-wide error enum. Uses thiserror for ergonomic error handling.
//! Network failures from the evaluation service arrive as [`social_api::Error`] and
//! are converted to "unavailable" results at the cache boundary; they only
//! surface here for direct (uncached) calls.

use thiserror::Error;

/// Result type alias for TrendSpotter operations
pub type Result<T> = std::result::Result<T, TrendSpotterError>;

/// Error type for TrendSpotter operations
#[derive(Error, Debug)]
pub enum TrendSpotterError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Evaluation service errors (transport, status, parse)
    #[error("API error: {0}")]
    Api(#[from] social_api::Error),

    /// No fresh or fetchable data for the named resource
    #[error("Data unavailable: {0}")]
    Unavailable(String),

    /// Refresh scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl TrendSpotterError {
    /// Whether this error means "nothing to show right now" rather than a fault
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TrendSpotterError::Unavailable(_))
    }
}
