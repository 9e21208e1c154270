//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Misconfiguration detected at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] storyreel_models::ModelError),

    #[error("Media error: {0}")]
    Media(#[from] storyreel_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn synthesis_failed(msg: impl Into<String>) -> Self {
        Self::SynthesisFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Errors that should stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigError(_) => true,
            Self::Media(e) => e.is_fatal_config(),
            _ => false,
        }
    }
}
