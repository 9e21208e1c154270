//! One trait per stage kind.
//!
//! The orchestrator only sees these traits, so any stage can be swapped
//! (for tests, or for a different tool) without touching the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use storyreel_models::{ExternalAudioSpec, StageOutcome};

use crate::caption::CaptionOverlay;
use crate::concat::{ConcatTarget, Concatenator};
use crate::external_audio::ExternalAudioMerger;
use crate::merge::AudioVideoMerger;

/// Puts narration onto footage.
#[async_trait]
pub trait MergeStage: Send + Sync {
    async fn merge(&self, audio: Option<&Path>, video: &Path, output: &Path) -> StageOutcome;
}

/// Burns a caption into a clip.
#[async_trait]
pub trait CaptionStage: Send + Sync {
    async fn overlay(&self, input: &Path, caption: &str, output: &Path) -> StageOutcome;
}

/// Joins clips into one video.
#[async_trait]
pub trait ConcatStage: Send + Sync {
    async fn concatenate(&self, inputs: &[PathBuf], target: &ConcatTarget) -> StageOutcome;
}

/// Mixes an external track under a video.
#[async_trait]
pub trait ExternalAudioStage: Send + Sync {
    async fn mix(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> StageOutcome;
}

#[async_trait]
impl MergeStage for AudioVideoMerger {
    async fn merge(&self, audio: Option<&Path>, video: &Path, output: &Path) -> StageOutcome {
        AudioVideoMerger::merge(self, audio, video, output).await
    }
}

#[async_trait]
impl CaptionStage for CaptionOverlay {
    async fn overlay(&self, input: &Path, caption: &str, output: &Path) -> StageOutcome {
        CaptionOverlay::overlay(self, input, caption, output).await
    }
}

#[async_trait]
impl ConcatStage for Concatenator {
    async fn concatenate(&self, inputs: &[PathBuf], target: &ConcatTarget) -> StageOutcome {
        Concatenator::concatenate(self, inputs, target).await
    }
}

#[async_trait]
impl ExternalAudioStage for ExternalAudioMerger {
    async fn mix(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> StageOutcome {
        self.merge(video, spec, output).await
    }
}
