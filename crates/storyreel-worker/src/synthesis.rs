//! Narration synthesis batching.
//!
//! The speech engine itself is an external collaborator behind
//! [`SpeechSynthesizer`]. [`BatchSynthesizer`] runs one concurrent pass
//! over all requests, then retries each failure sequentially with
//! backoff, making a fresh call per attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use storyreel_models::ItemFailure;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

const SYNTHESIS_TOTAL: &str = "storyreel_synthesis_total";

/// Text-to-speech engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` to an audio file at `output` and return its path.
    async fn synthesize(&self, text: &str, output: &Path) -> WorkerResult<PathBuf>;
}

/// One narration line to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub index: usize,
    pub text: String,
    pub output: PathBuf,
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct SynthesisReport {
    /// `(index, audio path)` sorted by index
    pub produced: Vec<(usize, PathBuf)>,
    pub failed: Vec<ItemFailure>,
}

/// Concurrent-then-sequential synthesis driver.
#[derive(Clone)]
pub struct BatchSynthesizer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    max_workers: usize,
    retry: RetryConfig,
}

impl BatchSynthesizer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, max_workers: usize, max_retries: u32) -> Self {
        Self {
            synthesizer,
            max_workers: max_workers.max(1),
            retry: RetryConfig::new("synthesis").with_max_retries(max_retries.saturating_sub(1)),
        }
    }

    /// Override backoff timing. `max_retries` keeps its meaning of
    /// sequential attempts per failed item.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn synthesize_all(&self, requests: Vec<SynthesisRequest>) -> SynthesisReport {
        if requests.is_empty() {
            return SynthesisReport::default();
        }

        let limit = Semaphore::new(self.max_workers);
        let first_pass = join_all(requests.iter().map(|request| {
            let limit = &limit;
            async move {
                let _permit = limit
                    .acquire()
                    .await
                    .map_err(|_| WorkerError::synthesis_failed("worker pool closed"))?;
                self.call(request).await
            }
        }))
        .await;

        let mut report = SynthesisReport::default();
        let mut retry_queue = Vec::new();
        for (request, result) in requests.into_iter().zip(first_pass) {
            match result {
                Ok(path) => report.produced.push((request.index, path)),
                Err(e) => {
                    warn!(index = request.index, error = %e, "Synthesis failed, queued for retry");
                    retry_queue.push(request);
                }
            }
        }

        if !retry_queue.is_empty() {
            info!(count = retry_queue.len(), "Retrying failed synthesis sequentially");
        }

        for request in retry_queue {
            let result = retry_async(&self.retry, || self.call(&request)).await;
            match result.into_result() {
                Ok(path) => report.produced.push((request.index, path)),
                Err(e) => report.failed.push(ItemFailure::new(request.index, e.to_string())),
            }
        }

        report.produced.sort_by_key(|(index, _)| *index);
        report.failed.sort_by_key(|f| f.index);
        counter!(SYNTHESIS_TOTAL, "status" => "ok").increment(report.produced.len() as u64);
        counter!(SYNTHESIS_TOTAL, "status" => "failed").increment(report.failed.len() as u64);
        info!(
            produced = report.produced.len(),
            failed = report.failed.len(),
            "Synthesis batch finished"
        );
        report
    }

    async fn call(&self, request: &SynthesisRequest) -> WorkerResult<PathBuf> {
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = self.synthesizer.synthesize(&request.text, &request.output).await?;
        if !path.is_file() {
            return Err(WorkerError::synthesis_failed(format!(
                "synthesizer reported {} but no file exists",
                path.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn requests(dir: &TempDir, texts: &[&str]) -> Vec<SynthesisRequest> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| SynthesisRequest {
                index,
                text: text.to_string(),
                output: dir.path().join(format!("audio_{}.mp3", index)),
            })
            .collect()
    }

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::new("synthesis")
            .with_max_retries(attempts.saturating_sub(1))
            .with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_all_succeed_in_first_pass() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize().times(3).returning(|_, output| {
            std::fs::write(output, b"mp3").unwrap();
            Ok(output.to_path_buf())
        });

        let batch = BatchSynthesizer::new(Arc::new(mock), 2, 3).with_retry(fast_retry(3));
        let report = batch.synthesize_all(requests(&dir, &["a", "b", "c"])).await;

        assert_eq!(report.produced.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(report.produced[2].0, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_in_retry_pass() {
        let dir = TempDir::new().unwrap();
        let flaky_calls = Arc::new(AtomicUsize::new(0));
        let counter = flaky_calls.clone();

        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize().returning(move |text, output| {
            if text == "flaky" && counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(WorkerError::synthesis_failed("rate limited"));
            }
            std::fs::write(output, b"mp3").unwrap();
            Ok(output.to_path_buf())
        });

        let batch = BatchSynthesizer::new(Arc::new(mock), 4, 3).with_retry(fast_retry(3));
        let report = batch.synthesize_all(requests(&dir, &["ok", "flaky"])).await;

        assert_eq!(report.produced.len(), 2);
        assert!(report.failed.is_empty());
        // one concurrent attempt plus two sequential
        assert_eq!(flaky_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize().returning(|text, output| {
            if text == "broken" {
                return Err(WorkerError::synthesis_failed("voice unavailable"));
            }
            std::fs::write(output, b"mp3").unwrap();
            Ok(output.to_path_buf())
        });

        let batch = BatchSynthesizer::new(Arc::new(mock), 2, 2).with_retry(fast_retry(2));
        let report = batch.synthesize_all(requests(&dir, &["fine", "broken", "also fine"])).await;

        assert_eq!(report.produced.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 1);
        assert!(report.failed[0].reason.contains("voice unavailable"));
    }

    #[tokio::test]
    async fn test_missing_output_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize()
            .returning(|_, output| Ok(output.to_path_buf()));

        let batch = BatchSynthesizer::new(Arc::new(mock), 1, 1).with_retry(fast_retry(1));
        let report = batch.synthesize_all(requests(&dir, &["ghost"])).await;

        assert!(report.produced.is_empty());
        assert_eq!(report.failed.len(), 1);
    }
}
