//! External audio: download, trim, loop, and mix under a finished video.
//!
//! The external track is silent until `start_time` and plays at `volume`
//! afterwards. It is looped until it covers the rest of the video, then
//! mixed with the video's own audio (narration stays at full level). The
//! video stream is copied untouched. Whatever goes wrong, the caller gets
//! the original video back as `Degraded`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyreel_models::{ExternalAudioSpec, StageOutcome};
use tracing::{info, warn};

use crate::command::ToolCommand;
use crate::download::AudioDownloader;
use crate::error::{MediaError, MediaResult};
use crate::executor::CommandExecutor;
use crate::fallback::{attempt_with_fallback, verify_output};
use crate::filters::concat_list_line;
use crate::probe::MetadataProbe;

const STAGE: &str = "external_audio";
const DOWNLOAD_STEM: &str = "external_audio";

/// Repetitions needed for `audio` seconds to cover `video - start`.
///
/// Always at least 1; a non-positive audio duration means 1.
pub fn loop_count(video_duration: f64, start_time: f64, audio_duration: f64) -> u32 {
    if audio_duration.is_nan() || audio_duration <= 0.0 {
        return 1;
    }
    let needed = (video_duration - start_time).max(0.0);
    let loops = (needed / audio_duration).ceil();
    if loops.is_finite() && loops >= 1.0 {
        loops.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Start offsets at or past the end of the video (or negative) become 0.
pub fn clamp_start(start_time: f64, video_duration: f64) -> f64 {
    if !start_time.is_finite() || start_time < 0.0 || start_time >= video_duration {
        0.0
    } else {
        start_time
    }
}

/// Volume stage with the mute gate as a timeline `enable` on a zeroing
/// volume filter.
fn gated_volume_primary(start: f64, volume: f64) -> String {
    if start > 0.0 {
        format!("volume=0:enable='lt(t,{:.3})',volume={:.3}", start, volume)
    } else {
        format!("volume={:.3}", volume)
    }
}

/// Same gate as a per-frame volume expression.
fn gated_volume_fallback(start: f64, volume: f64) -> String {
    format!("volume='if(lt(t,{:.3}),0,{:.3})':eval=frame", start, volume)
}

/// Full `-filter_complex` graph producing `[aout]`.
fn mix_graph(gate: &str, base_has_audio: bool, video_duration: f64, normalize_flag: bool) -> String {
    if base_has_audio {
        let normalize = if normalize_flag { ":normalize=0" } else { "" };
        format!(
            "[1:a]{gate}[ext];[0:a][ext]amix=inputs=2:duration=first:dropout_transition=0{normalize}[aout]"
        )
    } else {
        format!("[1:a]{gate},atrim=0:{:.3},asetpts=PTS-STARTPTS[aout]", video_duration)
    }
}

/// Mixes a downloaded track into a finished video.
#[derive(Clone)]
pub struct ExternalAudioMerger {
    executor: Arc<dyn CommandExecutor>,
    probe: MetadataProbe,
    downloader: AudioDownloader,
    work_dir: PathBuf,
}

impl ExternalAudioMerger {
    pub fn new(executor: Arc<dyn CommandExecutor>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            probe: MetadataProbe::new(executor.clone()),
            downloader: AudioDownloader::new(executor.clone()),
            executor,
            work_dir: work_dir.into(),
        }
    }

    /// Mix `spec` under `video`, writing `output`.
    ///
    /// Returns `Success(output)` or `Degraded(video)`.
    pub async fn merge(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> StageOutcome {
        let outcome = attempt_with_fallback(STAGE, video, async {
            let result = self.try_merge(video, spec, output).await;
            if result.is_err() && output != video {
                let _ = tokio::fs::remove_file(output).await;
            }
            result
        })
        .await;

        match &outcome {
            StageOutcome::Success(path) => {
                info!(output = %path.display(), url = %spec.url, "External audio mixed");
            }
            _ => warn!(video = %video.display(), url = %spec.url, "External audio not applied"),
        }
        outcome
    }

    async fn try_merge(&self, video: &Path, spec: &ExternalAudioSpec, output: &Path) -> MediaResult<PathBuf> {
        if !video.is_file() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        if output == video {
            return Err(MediaError::invalid_input("output must differ from the input video"));
        }

        let (volume, reset) = spec.effective_volume();
        if reset {
            warn!(requested = spec.volume, "Volume outside [0, 1], using 1.0");
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("external_audio_")
            .tempdir_in(&self.work_dir)?;

        let downloaded = self
            .downloader
            .download_audio(&spec.url, scratch.path(), DOWNLOAD_STEM)
            .await?;

        let audio = if spec.trim_lead_seconds > 0.0 {
            self.trim_lead(&downloaded, spec.trim_lead_seconds, scratch.path())
                .await
        } else {
            downloaded
        };

        let video_meta = self.probe.metadata(video).await;
        let audio_duration = self.probe.duration(&audio).await;

        let start = clamp_start(spec.start_time, video_meta.duration);
        if start != spec.start_time {
            warn!(
                requested = spec.start_time,
                video_duration = video_meta.duration,
                "Start time outside the video, starting at 0"
            );
        }

        let loops = loop_count(video_meta.duration, start, audio_duration);
        let track = if loops > 1 {
            self.loop_track(&audio, loops, scratch.path()).await?
        } else {
            audio
        };

        info!(
            start,
            volume,
            loops,
            video_duration = video_meta.duration,
            audio_duration,
            "Mixing external audio"
        );

        self.mix(video, &track, start, volume, video_meta.has_audio, video_meta.duration, output)
            .await
    }

    /// Cut `seconds` off the front; on failure keep the untrimmed audio.
    async fn trim_lead(&self, audio: &Path, seconds: f64, dir: &Path) -> PathBuf {
        let ext = audio
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_string());
        let command = ToolCommand::ffmpeg()
            .args(["-ss".to_string(), format!("{:.3}", seconds)])
            .input(audio)
            .args(["-c:a", "copy"])
            .output(dir.join(format!("external_trimmed.{}", ext)));

        let executor = self.executor.clone();
        attempt_with_fallback("external_audio_trim", audio, async move {
            executor.execute(command).await?.into_output_path()
        })
        .await
        .into_path()
        .unwrap_or_else(|| audio.to_path_buf())
    }

    /// Repeat the track `loops` times: concat demuxer copy first, then
    /// `-stream_loop` re-encode.
    async fn loop_track(&self, audio: &Path, loops: u32, dir: &Path) -> MediaResult<PathBuf> {
        let absolute = tokio::fs::canonicalize(audio).await?;
        let line = concat_list_line(&absolute);
        let list: String = (0..loops).map(|_| format!("{}\n", line)).collect();
        let list_path = dir.join("loop_list.txt");
        tokio::fs::write(&list_path, list).await?;

        let ext = audio
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_string());
        let primary = ToolCommand::ffmpeg()
            .args(["-f", "concat", "-safe", "0"])
            .input(&list_path)
            .args(["-c", "copy"])
            .output(dir.join(format!("external_looped.{}", ext)));

        match self.run_checked(primary).await {
            Ok(path) => Ok(path),
            Err(e) => {
                warn!(error = %e, loops, "Concat loop failed, retrying with stream_loop");
                let fallback = ToolCommand::ffmpeg()
                    .args(["-stream_loop".to_string(), (loops - 1).to_string()])
                    .input(audio)
                    .args(["-c:a", "aac", "-b:a", "192k"])
                    .output(dir.join("external_looped_alt.m4a"));
                self.run_checked(fallback).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn mix(
        &self,
        video: &Path,
        track: &Path,
        start: f64,
        volume: f64,
        base_has_audio: bool,
        video_duration: f64,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        let build = |graph: String| {
            ToolCommand::ffmpeg()
                .input(video)
                .input(track)
                .filter_complex(graph)
                .map("0:v")
                .map("[aout]")
                .args(["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"])
                .output(output)
        };

        let primary = mix_graph(&gated_volume_primary(start, volume), base_has_audio, video_duration, true);
        match self.run_checked(build(primary)).await {
            Ok(path) => Ok(path),
            Err(e) => {
                warn!(error = %e, "Mix failed, retrying with frame-evaluated volume");
                let fallback = mix_graph(&gated_volume_fallback(start, volume), base_has_audio, video_duration, false);
                self.run_checked(build(fallback)).await
            }
        }
    }

    async fn run_checked(&self, command: ToolCommand) -> MediaResult<PathBuf> {
        let path = self.executor.execute(command).await?.into_output_path()?;
        verify_output(&path).await?;
        Ok(path)
    }
}
