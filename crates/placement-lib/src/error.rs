//! Error types for the placement engine

use thiserror::Error;

/// Errors surfaced by the placement engine and its collaborators
#[derive(Debug, Error)]
pub enum PlacementError {
    /// A scoring input fell outside the inclusive `[0, 1]` range
    #[error("{parameter} must be in the range 0-1, got {value}")]
    ScoreOutOfRange { parameter: &'static str, value: f64 },

    /// The workload description failed validation at ingestion
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    /// The device registry answered with something we could not use
    #[error("device registry error: {0}")]
    Source(String),

    /// Transport failure while talking to the device registry
    #[error("device registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registry payload could not be decoded
    #[error("failed to decode registry payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Registry endpoint could not be built from the configured base URL
    #[error("invalid registry URL: {0}")]
    Url(#[from] url::ParseError),
}

impl PlacementError {
    /// Returns true if the error came from the upstream device registry
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PlacementError::Source(_)
                | PlacementError::Http(_)
                | PlacementError::Decode(_)
                | PlacementError::Url(_)
        )
    }
}

/// Result type for placement operations
pub type Result<T> = std::result::Result<T, PlacementError>;
