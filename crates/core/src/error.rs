//! Centralized error types for the Rainbow Finder workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to subsystems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RainbowError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RainbowError {
    /// Only upstream throttling is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

pub type RainbowResult<T> = Result<T, RainbowError>;
