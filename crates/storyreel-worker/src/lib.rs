//! StoryReel processing worker.
//!
//! This crate provides:
//! - Per-item merge and caption orchestration
//! - Manifest processing with concat and external audio
//! - Narration synthesis batching with retry
//! - Environment configuration and run logging

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod synthesis;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use pipeline::{BatchReport, Pipeline};
pub use retry::{retry_async, RetryConfig, RetryResult};
pub use service::{ProcessingReport, ProcessingRequest, ProcessingService};
pub use synthesis::{BatchSynthesizer, SpeechSynthesizer, SynthesisReport, SynthesisRequest};
