//! Structured run logging utilities.
//!
//! Every lifecycle log of a manifest run carries the same `run_id` and
//! `operation` fields so a run can be followed through JSON logs.

use tracing::{error, info, warn, Span};

/// Run logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
}

impl RunLogger {
    /// Create a logger for a run. `run_id` is usually the project id.
    pub fn new(run_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            operation: operation.into(),
        }
    }

    /// Logger for runs without a project id, stamped with the start time.
    pub fn adhoc(operation: impl Into<String>) -> Self {
        let run_id = format!("adhoc-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
        Self::new(run_id, operation)
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, operation = %self.operation, "Run started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(run_id = %self.run_id, operation = %self.operation, "Run progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(run_id = %self.run_id, operation = %self.operation, "Run warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(run_id = %self.run_id, operation = %self.operation, "Run error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, operation = %self.operation, "Run completed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the run fields, for instrumenting nested work.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, operation = %self.operation)
    }
}
