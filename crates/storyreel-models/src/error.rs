//! Model-level validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid clock time '{0}', expected seconds or M:SS")]
    InvalidClockTime(String),

    #[error("Unknown caption position: {0}")]
    UnknownPosition(String),

    #[error("Invalid audio URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Manifest parse error: {0}")]
    Manifest(#[from] serde_json::Error),
}
