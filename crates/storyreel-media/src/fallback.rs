//! Stage-boundary error conversion.
//!
//! Media stages run their tool invocations as a fallible future and hand
//! it to [`attempt_with_fallback`], which turns any error (or an empty
//! output) into [`StageOutcome::Degraded`] carrying the stage input.

use std::future::Future;
use std::path::{Path, PathBuf};

use storyreel_models::StageOutcome;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::telemetry;

/// Run `attempt`; on failure fall back to `fallback`.
pub async fn attempt_with_fallback<F>(stage: &'static str, fallback: &Path, attempt: F) -> StageOutcome
where
    F: Future<Output = MediaResult<PathBuf>>,
{
    let result = match attempt.await {
        Ok(path) => verify_output(&path).await.map(|_| path),
        Err(e) => Err(e),
    };

    let outcome = match result {
        Ok(path) => {
            debug!(stage, output = %path.display(), "Stage succeeded");
            StageOutcome::Success(path)
        }
        Err(e) => {
            warn!(
                stage,
                error = %e,
                stderr = e.stderr().unwrap_or(""),
                fallback = %fallback.display(),
                "Stage failed, continuing with its input"
            );
            StageOutcome::Degraded(fallback.to_path_buf())
        }
    };

    telemetry::record_stage_outcome(stage, &outcome);
    outcome
}

/// Succeeds only for an existing, non-empty regular file.
pub async fn verify_output(path: &Path) -> MediaResult<()> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(MediaError::EmptyOutput(path.to_path_buf()));
    }
    Ok(())
}
