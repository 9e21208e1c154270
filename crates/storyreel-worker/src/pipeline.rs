//! Per-item processing and batch orchestration.
//!
//! Each item walks `Pending -> Merging -> Captioning -> Done`. A failed
//! merge means the original footage is captioned; a failed caption means
//! the merged clip is kept. Both are successful terminal states. Only a
//! missing source (or a crash inside the item's task) excludes an item.
//!
//! All items of a batch are spawned together. The only concurrency bound
//! is the executor's process semaphore, shared by every stage.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use storyreel_media::fs_utils::{move_file, remove_quietly};
use storyreel_media::telemetry;
use storyreel_media::stages::{CaptionStage, ConcatStage, ExternalAudioStage, MergeStage};
use storyreel_media::{
    AudioVideoMerger, CaptionOverlay, CommandExecutor, ConcatTarget, Concatenator, ExternalAudioMerger,
};
use storyreel_models::{
    CaptionStyle, ExternalAudioSpec, ItemFailure, ItemResult, ItemState, NormalizationProfile, StageOutcome,
    WorkItem,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};

/// Results of one batch, each list sorted by manifest index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub clips: Vec<ItemResult>,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    /// Clip paths in manifest order.
    pub fn clip_paths(&self) -> Vec<PathBuf> {
        self.clips.iter().map(|c| c.clip_path.clone()).collect()
    }
}

/// Stage wiring shared by every item.
#[derive(Clone)]
pub struct Pipeline {
    merger: Arc<dyn MergeStage>,
    overlay: Arc<dyn CaptionStage>,
    concatenator: Arc<dyn ConcatStage>,
    external_audio: Arc<dyn ExternalAudioStage>,
    clips_dir: PathBuf,
}

impl Pipeline {
    /// `clips_dir` receives per-item clips; `work_dir` holds scratch
    /// directories for concatenation and external audio.
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        clips_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        style: CaptionStyle,
    ) -> Self {
        Self::with_profile(executor, clips_dir, work_dir, style, NormalizationProfile::default())
    }

    /// Like [`Pipeline::new`] with a custom concat normalization profile.
    pub fn with_profile(
        executor: Arc<dyn CommandExecutor>,
        clips_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        style: CaptionStyle,
        profile: NormalizationProfile,
    ) -> Self {
        let work_dir = work_dir.into();
        Self {
            merger: Arc::new(AudioVideoMerger::new(executor.clone())),
            overlay: Arc::new(CaptionOverlay::new(executor.clone(), style)),
            concatenator: Arc::new(Concatenator::new(executor.clone(), &work_dir).with_profile(profile)),
            external_audio: Arc::new(ExternalAudioMerger::new(executor, &work_dir)),
            clips_dir: clips_dir.into(),
        }
    }

    /// Assemble from arbitrary stage implementations.
    pub fn from_stages(
        merger: Arc<dyn MergeStage>,
        overlay: Arc<dyn CaptionStage>,
        concatenator: Arc<dyn ConcatStage>,
        external_audio: Arc<dyn ExternalAudioStage>,
        clips_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            merger,
            overlay,
            concatenator,
            external_audio,
            clips_dir: clips_dir.into(),
        }
    }

    pub fn clips_dir(&self) -> &Path {
        &self.clips_dir
    }

    /// Run every item concurrently and collect results in manifest order.
    pub async fn process_items(&self, items: Vec<WorkItem>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut set = JoinSet::new();

        for item in items {
            if !item.source_exists() {
                error!(
                    index = item.index,
                    source = %item.source_video_path.display(),
                    "Source video missing, dropping item"
                );
                telemetry::record_item("failed");
                report.failures.push(ItemFailure::new(
                    item.index,
                    format!("source video not found: {}", item.source_video_path.display()),
                ));
                continue;
            }

            let pipeline = self.clone();
            let span = tracing::info_span!("item", index = item.index);
            set.spawn(
                async move {
                    let index = item.index;
                    AssertUnwindSafe(pipeline.process_item(&item))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(ItemFailure::new(index, "item task panicked")))
                }
                .instrument(span),
            );
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => report.clips.push(result),
                Ok(Err(failure)) => {
                    error!(index = failure.index, reason = %failure.reason, "Item failed");
                    report.failures.push(failure);
                }
                Err(e) => error!(error = %e, "Item task did not complete"),
            }
        }

        report.clips.sort_by_key(|c| c.index);
        report.failures.sort_by_key(|f| f.index);
        info!(
            clips = report.clips.len(),
            failures = report.failures.len(),
            "Batch processed"
        );
        report
    }

    /// Drive one item through merge and caption.
    pub async fn process_item(&self, item: &WorkItem) -> Result<ItemResult, ItemFailure> {
        let mut state = ItemState::Pending;
        if !item.source_exists() {
            telemetry::record_item("failed");
            return Err(ItemFailure::new(item.index, "source video not found"));
        }

        let stem = item.clip_stem();
        let merged_path = self.clips_dir.join(format!("merged_{}.mp4", stem));
        let final_path = self.clips_dir.join(format!("{}.mp4", stem));

        state = state.advance();
        debug!(index = item.index, %state, "Merging narration");
        let merged = self
            .merger
            .merge(item.audio_path.as_deref(), &item.source_video_path, &merged_path)
            .await;
        let Some(caption_input) = merged.path().map(Path::to_path_buf) else {
            return Err(self.fail(item.index, &merged_path, "merge produced nothing").await);
        };

        state = state.advance();
        debug!(index = item.index, %state, "Captioning");
        let captioned = self
            .overlay
            .overlay(&caption_input, &item.caption_text, &final_path)
            .await;

        let clip_path = match &captioned {
            StageOutcome::Success(path) => {
                if merged.is_success() {
                    remove_quietly(&merged_path).await;
                }
                path.clone()
            }
            StageOutcome::Degraded(_) if merged.is_success() => {
                // keep the merged clip under the final name
                if let Err(e) = move_file(&merged_path, &final_path).await {
                    return Err(self.fail(item.index, &merged_path, &e.to_string()).await);
                }
                final_path
            }
            StageOutcome::Degraded(path) => path.clone(),
            StageOutcome::Failed => {
                return Err(self.fail(item.index, &merged_path, "caption produced nothing").await);
            }
        };

        state = state.advance();
        let degraded = merged.is_degraded() || captioned.is_degraded();
        telemetry::record_item(if degraded { "degraded" } else { "done" });
        info!(
            index = item.index,
            %state,
            clip = %clip_path.display(),
            merge = merged.label(),
            caption = captioned.label(),
            "Item finished"
        );

        Ok(ItemResult {
            index: item.index,
            clip_path,
            state,
            degraded,
        })
    }

    async fn fail(&self, index: usize, intermediate: &Path, reason: &str) -> ItemFailure {
        remove_quietly(intermediate).await;
        telemetry::record_item("failed");
        ItemFailure::new(index, reason)
    }

    /// Join clips into one video.
    pub async fn concatenate(&self, clips: &[PathBuf], target: &ConcatTarget) -> StageOutcome {
        self.concatenator.concatenate(clips, target).await
    }

    /// Mix external audio under `video` into `output`.
    pub async fn apply_external_audio(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> StageOutcome {
        self.external_audio.mix(video, spec, output).await
    }
}
