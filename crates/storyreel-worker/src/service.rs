//! Manifest-level entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use storyreel_media::concat::final_file_name;
use storyreel_media::fs_utils::{move_file, remove_quietly, sibling_with_suffix};
use storyreel_media::{CommandExecutor, ConcatTarget};
use storyreel_models::{ExternalAudioSpec, ItemFailure, ItemResult, Manifest, StageOutcome, WorkItem};
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::pipeline::Pipeline;
use crate::synthesis::{BatchSynthesizer, SynthesisRequest};

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct ProcessingRequest {
    /// Final video goes to `<output_root>/<project_id>/`
    pub project_id: Option<String>,
    /// Overrides the configured external audio
    pub external_audio: Option<ExternalAudioSpec>,
    /// Explicit final path; wins over `project_id`
    pub output: Option<PathBuf>,
}

impl ProcessingRequest {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_external_audio(mut self, spec: ExternalAudioSpec) -> Self {
        self.external_audio = Some(spec);
        self
    }
}

/// What a manifest run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub project_id: Option<String>,
    pub clips: Vec<ItemResult>,
    pub failures: Vec<ItemFailure>,
    /// `None` when no clip survived or concatenation failed
    pub final_video: Option<PathBuf>,
    /// Outcome label of the external audio mix, when one was requested
    pub external_audio: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Runs a whole manifest: synthesis, per-item pipeline, concat and
/// external audio.
#[derive(Clone)]
pub struct ProcessingService {
    pipeline: Pipeline,
    synthesizer: Option<BatchSynthesizer>,
    audio_dir: PathBuf,
    videos_dir: PathBuf,
    output_root: PathBuf,
    external_audio: Option<ExternalAudioSpec>,
}

impl ProcessingService {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: &WorkerConfig) -> Self {
        Self {
            pipeline: Pipeline::new(
                executor,
                config.work_dir.join("clips"),
                &config.work_dir,
                config.caption_style.clone(),
            ),
            synthesizer: None,
            audio_dir: config.audio_dir.clone(),
            videos_dir: config.videos_dir.clone(),
            output_root: config.output_root.clone(),
            external_audio: config.external_audio.clone(),
        }
    }

    /// Synthesize narration for items whose audio file is missing.
    pub fn with_synthesizer(mut self, synthesizer: BatchSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn process_manifest(
        &self,
        manifest: &Manifest,
        request: &ProcessingRequest,
    ) -> WorkerResult<ProcessingReport> {
        let logger = match &request.project_id {
            Some(id) => RunLogger::new(id.clone(), "process_manifest"),
            None => RunLogger::adhoc("process_manifest"),
        };
        let span = logger.create_span();
        self.run(manifest, request, &logger).instrument(span).await
    }

    async fn run(
        &self,
        manifest: &Manifest,
        request: &ProcessingRequest,
        logger: &RunLogger,
    ) -> WorkerResult<ProcessingReport> {
        if manifest.is_empty() {
            return Err(WorkerError::processing_failed("manifest has no entries"));
        }
        logger.log_start(&format!("{} manifest entries", manifest.len()));

        let (items, mut failures): (Vec<WorkItem>, Vec<ItemFailure>) = {
            let mut present = Vec::new();
            let mut missing = Vec::new();
            for item in manifest.work_items(&self.audio_dir, &self.videos_dir) {
                if item.source_exists() {
                    present.push(item);
                } else {
                    logger.log_warning(&format!(
                        "item {} dropped, source video {} not found",
                        item.index,
                        item.source_video_path.display()
                    ));
                    missing.push(ItemFailure::new(
                        item.index,
                        format!("source video not found: {}", item.source_video_path.display()),
                    ));
                }
            }
            (present, missing)
        };

        let items = self.ensure_narration(items, logger).await;

        let batch = self.pipeline.process_items(items).await;
        failures.extend(batch.failures.iter().cloned());
        failures.sort_by_key(|f| f.index);
        logger.log_progress(&format!(
            "{} clips ready, {} items failed",
            batch.clips.len(),
            failures.len()
        ));

        let mut report = ProcessingReport {
            project_id: request.project_id.clone(),
            clips: batch.clips.clone(),
            failures,
            final_video: None,
            external_audio: None,
            finished_at: Utc::now(),
        };

        if batch.clips.is_empty() {
            logger.log_error("no clips produced, skipping concatenation");
            report.finished_at = Utc::now();
            return Ok(report);
        }

        let target = self.concat_target(request);
        let final_video = match self.pipeline.concatenate(&batch.clip_paths(), &target).await {
            StageOutcome::Success(path) | StageOutcome::Degraded(path) => path,
            StageOutcome::Failed => {
                logger.log_error("concatenation failed");
                report.finished_at = Utc::now();
                return Ok(report);
            }
        };

        if let Some(spec) = request.external_audio.as_ref().or(self.external_audio.as_ref()) {
            let outcome = self.mix_in_place(&final_video, spec).await?;
            if outcome.is_degraded() {
                logger.log_warning("external audio not applied, keeping narration-only video");
            }
            report.external_audio = Some(outcome.label().to_string());
        }

        logger.log_completion(&format!("final video {}", final_video.display()));
        report.final_video = Some(final_video);
        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Fill in narration for items whose audio file is absent. Items the
    /// synthesizer cannot serve continue caption-only.
    async fn ensure_narration(&self, mut items: Vec<WorkItem>, logger: &RunLogger) -> Vec<WorkItem> {
        let requests: Vec<SynthesisRequest> = items
            .iter()
            .filter(|item| !item.has_audio())
            .map(|item| SynthesisRequest {
                index: item.index,
                text: item.caption_text.clone(),
                output: item
                    .audio_path
                    .clone()
                    .unwrap_or_else(|| self.audio_dir.join(format!("{}.mp3", item.clip_stem()))),
            })
            .collect();

        if requests.is_empty() {
            return items;
        }

        let Some(synthesizer) = &self.synthesizer else {
            logger.log_warning(&format!(
                "{} items have no narration and no synthesizer is configured",
                requests.len()
            ));
            for item in items.iter_mut().filter(|item| !item.has_audio()) {
                item.audio_path = None;
            }
            return items;
        };

        logger.log_progress(&format!("synthesizing narration for {} items", requests.len()));
        let report = synthesizer.synthesize_all(requests).await;

        for item in items.iter_mut() {
            if let Some((_, path)) = report.produced.iter().find(|(index, _)| *index == item.index) {
                item.audio_path = Some(path.clone());
            } else if report.failed.iter().any(|f| f.index == item.index) {
                logger.log_warning(&format!("item {} continues without narration", item.index));
                item.audio_path = None;
            }
        }
        items
    }

    fn concat_target(&self, request: &ProcessingRequest) -> ConcatTarget {
        match (&request.output, &request.project_id) {
            (Some(path), _) => ConcatTarget::Path(path.clone()),
            (None, Some(project_id)) => ConcatTarget::project(&self.output_root, project_id.clone()),
            (None, None) => ConcatTarget::Path(self.output_root.join(final_file_name())),
        }
    }

    /// Replace `video` with a version carrying external audio. On a
    /// degraded mix the original file is put back.
    async fn mix_in_place(&self, video: &Path, spec: &ExternalAudioSpec) -> WorkerResult<StageOutcome> {
        let aside = sibling_with_suffix(video, "_temp");
        move_file(video, &aside).await?;

        let outcome = self.pipeline.apply_external_audio(&aside, spec, video).await;
        match &outcome {
            StageOutcome::Success(_) => remove_quietly(&aside).await,
            _ => {
                remove_quietly(video).await;
                move_file(&aside, video).await?;
            }
        }
        Ok(match outcome {
            StageOutcome::Success(_) => StageOutcome::Success(video.to_path_buf()),
            _ => StageOutcome::Degraded(video.to_path_buf()),
        })
    }

    /// Mix external audio under an existing video.
    pub async fn apply_external_audio(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> StageOutcome {
        self.pipeline.apply_external_audio(video, spec, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_media::testing::FakeExecutor;
    use storyreel_media::Tool;
    use storyreel_models::ManifestEntry;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: WorkerConfig,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = WorkerConfig {
                work_dir: dir.path().join("work"),
                output_root: dir.path().join("out"),
                audio_dir: dir.path().join("audio"),
                videos_dir: dir.path().join("videos"),
                ..Default::default()
            };
            tokio::fs::create_dir_all(&config.audio_dir).await.unwrap();
            tokio::fs::create_dir_all(&config.videos_dir).await.unwrap();
            Self { dir, config }
        }

        async fn entry(&self, manifest: &mut Manifest, n: usize, with_video: bool) {
            let audio = format!("audio_{}.mp3", n);
            tokio::fs::write(self.config.audio_dir.join(&audio), b"a").await.unwrap();
            let video = format!("v{}.mp4", n);
            if with_video {
                tokio::fs::write(self.config.videos_dir.join(&video), b"v").await.unwrap();
            }
            manifest.push(
                audio,
                ManifestEntry {
                    source_video: video,
                    clip: None,
                    line: format!("Line {}", n),
                },
            );
        }
    }

    #[tokio::test]
    async fn test_manifest_to_project_video() {
        let fx = Fixture::new().await;
        let mut manifest = Manifest::default();
        for n in 1..=3 {
            fx.entry(&mut manifest, n, true).await;
        }

        let fake = Arc::new(FakeExecutor::new());
        let service = ProcessingService::new(fake.clone(), &fx.config);
        let report = service
            .process_manifest(&manifest, &ProcessingRequest::for_project("demo"))
            .await
            .unwrap();

        assert_eq!(report.clips.len(), 3);
        assert!(report.failures.is_empty());
        let final_video = report.final_video.unwrap();
        assert!(final_video.starts_with(fx.dir.path().join("out").join("demo")));
        assert!(final_video.is_file());
        assert!(report.external_audio.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_reported_not_fatal() {
        let fx = Fixture::new().await;
        let mut manifest = Manifest::default();
        fx.entry(&mut manifest, 1, true).await;
        fx.entry(&mut manifest, 2, false).await;

        let service = ProcessingService::new(Arc::new(FakeExecutor::new()), &fx.config);
        let report = service
            .process_manifest(&manifest, &ProcessingRequest::default())
            .await
            .unwrap();

        assert_eq!(report.clips.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(report.final_video.is_some());
    }

    #[tokio::test]
    async fn test_degraded_external_audio_restores_video() {
        let fx = Fixture::new().await;
        let mut manifest = Manifest::default();
        fx.entry(&mut manifest, 1, true).await;
        fx.entry(&mut manifest, 2, true).await;

        let fake = Arc::new(FakeExecutor::new().fail_when(Tool::YtDlp, "--extract-audio"));
        let service = ProcessingService::new(fake, &fx.config);
        let output = fx.dir.path().join("final.mp4");
        let request = ProcessingRequest::default()
            .with_output(&output)
            .with_external_audio(ExternalAudioSpec::new("https://example.com/track"));

        let report = service.process_manifest(&manifest, &request).await.unwrap();
        assert_eq!(report.final_video.as_deref(), Some(output.as_path()));
        assert_eq!(report.external_audio.as_deref(), Some("degraded"));
        assert!(output.is_file());
        assert!(!sibling_with_suffix(&output, "_temp").exists());
    }

    #[tokio::test]
    async fn test_external_audio_replaces_final_video() {
        let fx = Fixture::new().await;
        let mut manifest = Manifest::default();
        fx.entry(&mut manifest, 1, true).await;

        let fake = Arc::new(FakeExecutor::new());
        let service = ProcessingService::new(fake.clone(), &fx.config);
        let output = fx.dir.path().join("final.mp4");
        let request = ProcessingRequest::default()
            .with_output(&output)
            .with_external_audio(ExternalAudioSpec::new("https://example.com/track").with_volume(0.3));

        let report = service.process_manifest(&manifest, &request).await.unwrap();
        assert_eq!(report.external_audio.as_deref(), Some("success"));
        assert!(output.is_file());
        assert!(!sibling_with_suffix(&output, "_temp").exists());
        assert_eq!(fake.ffmpeg_calls_mentioning("amix").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_manifest_is_an_error() {
        let fx = Fixture::new().await;
        let service = ProcessingService::new(Arc::new(FakeExecutor::new()), &fx.config);
        assert!(service
            .process_manifest(&Manifest::default(), &ProcessingRequest::default())
            .await
            .is_err());
    }
}
