//! Narration audio onto source footage.

use std::path::Path;
use std::sync::Arc;

use storyreel_models::StageOutcome;
use tracing::{info, warn};

use crate::command::ToolCommand;
use crate::executor::CommandExecutor;
use crate::fallback::attempt_with_fallback;
use crate::telemetry;

const STAGE: &str = "merge";

/// Replaces a video's audio with a narration track.
#[derive(Clone)]
pub struct AudioVideoMerger {
    executor: Arc<dyn CommandExecutor>,
}

impl AudioVideoMerger {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Video stream is copied, audio comes from `audio`, and the result is
    /// cut to the shorter of the two.
    ///
    /// Missing audio or a tool failure yields `Degraded(video)`.
    pub async fn merge(&self, audio: Option<&Path>, video: &Path, output: &Path) -> StageOutcome {
        let audio = match audio.filter(|a| a.is_file()) {
            Some(audio) => audio,
            None => {
                warn!(
                    video = %video.display(),
                    audio = ?audio,
                    "No narration audio, keeping source video"
                );
                let outcome = StageOutcome::Degraded(video.to_path_buf());
                telemetry::record_stage_outcome(STAGE, &outcome);
                return outcome;
            }
        };

        let command = merge_command(audio, video, output);
        let executor = self.executor.clone();
        let outcome = attempt_with_fallback(STAGE, video, async move {
            executor.execute(command).await?.into_output_path()
        })
        .await;

        if let StageOutcome::Success(path) = &outcome {
            info!(output = %path.display(), "Merged narration onto video");
        }
        outcome
    }
}

fn merge_command(audio: &Path, video: &Path, output: &Path) -> ToolCommand {
    ToolCommand::ffmpeg()
        .input(video)
        .input(audio)
        .map("0:v")
        .map("1:a")
        .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
        .output(output)
}
