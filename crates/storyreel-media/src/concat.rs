//! Two-pass concatenation.
//!
//! Pass one re-encodes every clip to the same [`NormalizationProfile`]
//! (frame rate, keyframe interval, pixel format, audio layout) so the
//! concat demuxer can join them without timestamp drift. Pass two joins
//! the normalized files through a list manifest. All intermediates live
//! in a scratch directory that is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use storyreel_models::item::sanitize_name;
use storyreel_models::{NormalizationProfile, StageOutcome};
use tracing::{error, info};

use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};
use crate::executor::CommandExecutor;
use crate::fallback::verify_output;
use crate::filters::concat_list_line;
use crate::probe::MetadataProbe;
use crate::telemetry;

const STAGE: &str = "concat";

/// Where the concatenated video goes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatTarget {
    /// Write exactly here.
    Path(PathBuf),
    /// Clear `<output_root>/<project_id>` and write a timestamped file in it.
    Project {
        output_root: PathBuf,
        project_id: String,
    },
}

impl ConcatTarget {
    pub fn project(output_root: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self::Project {
            output_root: output_root.into(),
            project_id: project_id.into(),
        }
    }
}

/// `final_<YYYYmmdd_HHMMSS>_<8 hex>.mp4`
pub fn final_file_name() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("final_{}_{}.mp4", stamp, &suffix[..8])
}

/// Joins clips into one normalized video.
#[derive(Clone)]
pub struct Concatenator {
    executor: Arc<dyn CommandExecutor>,
    probe: MetadataProbe,
    profile: NormalizationProfile,
    work_dir: PathBuf,
}

impl Concatenator {
    pub fn new(executor: Arc<dyn CommandExecutor>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            probe: MetadataProbe::new(executor.clone()),
            executor,
            profile: NormalizationProfile::default(),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_profile(mut self, profile: NormalizationProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Concatenate `inputs` in order. Any failure yields `Failed`.
    pub async fn concatenate(&self, inputs: &[PathBuf], target: &ConcatTarget) -> StageOutcome {
        let outcome = match self.try_concatenate(inputs, target).await {
            Ok(path) => {
                info!(output = %path.display(), clips = inputs.len(), "Concatenated clips");
                StageOutcome::Success(path)
            }
            Err(e) => {
                error!(error = %e, clips = inputs.len(), "Concatenation failed");
                StageOutcome::Failed
            }
        };
        telemetry::record_stage_outcome(STAGE, &outcome);
        outcome
    }

    /// Concatenate, surfacing the error.
    pub async fn try_concatenate(&self, inputs: &[PathBuf], target: &ConcatTarget) -> MediaResult<PathBuf> {
        if inputs.is_empty() {
            return Err(MediaError::invalid_input("no clips to concatenate"));
        }
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            return Err(MediaError::FileNotFound(missing.clone()));
        }

        let output = prepare_target(target).await?;

        let result = if inputs.len() == 1 {
            self.rewrap(&inputs[0], &output).await
        } else {
            self.normalize_and_join(inputs, &output).await
        };

        match result {
            Ok(path) => {
                verify_output(&path).await?;
                Ok(path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&output).await;
                Err(e)
            }
        }
    }

    /// Single clip: stream copy into the target container.
    async fn rewrap(&self, input: &Path, output: &Path) -> MediaResult<PathBuf> {
        let command = ToolCommand::ffmpeg()
            .input(input)
            .args(["-c", "copy", "-movflags", "+faststart"])
            .output(output);
        self.executor.execute(command).await?.into_output_path()
    }

    async fn normalize_and_join(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("concat_")
            .tempdir_in(&self.work_dir)?;

        let normalized = try_join_all(inputs.iter().enumerate().map(|(i, input)| {
            let target = scratch.path().join(format!("norm_{:03}.mp4", i));
            self.normalize(input, target)
        }))
        .await?;

        let mut manifest = String::new();
        for path in &normalized {
            let absolute = tokio::fs::canonicalize(path).await?;
            manifest.push_str(&concat_list_line(&absolute));
            manifest.push('\n');
        }
        let list_path = scratch.path().join("concat_list.txt");
        tokio::fs::write(&list_path, manifest).await?;

        let command = ToolCommand::ffmpeg()
            .args(["-f", "concat", "-safe", "0"])
            .input(&list_path)
            .args(self.profile.video_args(&self.profile.concat_preset))
            .args(self.profile.audio_args())
            .args(["-movflags", "+faststart"])
            .output(output);

        let path = self.executor.execute(command).await?.into_output_path()?;
        // scratch is dropped here, removing normalized clips and the list
        Ok(path)
    }

    /// Re-encode one clip to the profile. Clips without audio get a
    /// silent track so every concat input has the same stream layout.
    async fn normalize(&self, input: &Path, target: PathBuf) -> MediaResult<PathBuf> {
        let meta = self.probe.metadata(input).await;

        let mut command = ToolCommand::ffmpeg().input(input);
        if meta.has_audio {
            command = command.map("0:v:0").map("0:a:0");
        } else {
            command = command
                .args(["-f", "lavfi"])
                .input(format!(
                    "anullsrc=channel_layout=stereo:sample_rate={}",
                    self.profile.sample_rate
                ))
                .map("0:v:0")
                .map("1:a:0")
                .arg("-shortest");
        }

        let command = command
            .args(self.profile.video_args(&self.profile.normalize_preset))
            .args(self.profile.audio_args())
            .args(["-af", "aresample=async=1"])
            .output(target);

        self.executor.execute(command).await?.into_output_path()
    }
}

async fn prepare_target(target: &ConcatTarget) -> MediaResult<PathBuf> {
    match target {
        ConcatTarget::Path(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            Ok(path.clone())
        }
        ConcatTarget::Project {
            output_root,
            project_id,
        } => {
            let safe_id = sanitize_name(project_id);
            if safe_id.is_empty() {
                return Err(MediaError::invalid_input(format!("invalid project id '{}'", project_id)));
            }
            let dir = output_root.join(safe_id);
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir).await?;
            }
            tokio::fs::create_dir_all(&dir).await?;
            Ok(dir.join(final_file_name()))
        }
    }
}
