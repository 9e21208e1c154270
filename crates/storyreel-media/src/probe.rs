//! FFprobe metadata with documented fallbacks.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use storyreel_models::media::{FALLBACK_CODEC, FALLBACK_DURATION_SECS, FALLBACK_RESOLUTION};
use storyreel_models::MediaMetadata;
use tracing::warn;

use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};
use crate::executor::CommandExecutor;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Reads duration, resolution and codec through the executor.
///
/// The plain accessors never fail: when probing does, the failure is
/// logged and the documented fallback is returned.
#[derive(Clone)]
pub struct MetadataProbe {
    executor: Arc<dyn CommandExecutor>,
}

impl MetadataProbe {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Probe a file, surfacing errors.
    pub async fn try_metadata(&self, path: &Path) -> MediaResult<MediaMetadata> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let command = ToolCommand::ffprobe()
            .args([
                "-show_entries",
                "format=duration:stream=codec_type,codec_name,width,height",
            ])
            .path(path);
        let output = self.executor.execute(command).await?;

        parse_ffprobe(&output.stdout)
    }

    /// Probe a file, substituting fallbacks on failure.
    pub async fn metadata(&self, path: &Path) -> MediaMetadata {
        match self.try_metadata(path).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Probe failed, using fallback metadata"
                );
                MediaMetadata::fallback()
            }
        }
    }

    /// Duration in seconds (fallback 10.0).
    pub async fn duration(&self, path: &Path) -> f64 {
        self.metadata(path).await.duration
    }

    /// Width and height (fallback 1920x1080).
    pub async fn resolution(&self, path: &Path) -> (u32, u32) {
        self.metadata(path).await.resolution()
    }

    /// Primary codec name (fallback "unknown").
    pub async fn codec(&self, path: &Path) -> String {
        self.metadata(path).await.codec
    }
}

/// Parse ffprobe JSON. Missing individual fields fall back per field.
fn parse_ffprobe(stdout: &str) -> MediaResult<MediaMetadata> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)?;

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let kind = |s: &FfprobeStream, k: &str| s.codec_type.as_deref() == Some(k);
    let video = probe.streams.iter().find(|s| kind(s, "video"));
    let audio = probe.streams.iter().find(|s| kind(s, "audio"));

    if video.is_none() && audio.is_none() && duration.is_none() {
        return Err(MediaError::invalid_input("ffprobe reported no streams"));
    }

    let codec = video
        .or(audio)
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_else(|| FALLBACK_CODEC.to_string());

    Ok(MediaMetadata {
        duration: duration.unwrap_or(FALLBACK_DURATION_SECS),
        width: video.and_then(|s| s.width).unwrap_or(FALLBACK_RESOLUTION.0),
        height: video.and_then(|s| s.height).unwrap_or(FALLBACK_RESOLUTION.1),
        codec,
        has_audio: audio.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExecutor, ProbeReply};
    use tempfile::TempDir;

    #[test]
    fn test_parse_ffprobe_video_with_audio() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let meta = parse_ffprobe(json).unwrap();
        assert_eq!(meta.duration, 12.48);
        assert_eq!(meta.resolution(), (1280, 720));
        assert_eq!(meta.codec, "h264");
        assert!(meta.has_audio);
    }

    #[test]
    fn test_parse_ffprobe_audio_only() {
        let json = r#"{"streams":[{"codec_type":"audio","codec_name":"mp3"}],"format":{"duration":"40.0"}}"#;
        let meta = parse_ffprobe(json).unwrap();
        assert_eq!(meta.duration, 40.0);
        assert_eq!(meta.codec, "mp3");
        assert_eq!(meta.resolution(), (1920, 1080));
    }

    #[test]
    fn test_parse_ffprobe_rejects_empty_report() {
        assert!(parse_ffprobe("{}").is_err());
        assert!(parse_ffprobe("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_uses_fallbacks() {
        let fake = Arc::new(FakeExecutor::new());
        let probe = MetadataProbe::new(fake.clone());

        let meta = probe.metadata(Path::new("/nope/missing.mp4")).await;
        assert_eq!(meta, MediaMetadata::fallback());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_failure_uses_fallbacks() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.mp4");
        tokio::fs::write(&file, b"junk").await.unwrap();

        let fake = Arc::new(FakeExecutor::new().fail_when(crate::command::Tool::Ffprobe, "broken"));
        let probe = MetadataProbe::new(fake);

        assert_eq!(probe.duration(&file).await, 10.0);
        assert_eq!(probe.resolution(&file).await, (1920, 1080));
        assert_eq!(probe.codec(&file).await, "unknown");
        assert!(probe.metadata(&file).await.has_audio);
    }

    #[tokio::test]
    async fn test_probe_reads_scripted_reply() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scene.mp4");
        tokio::fs::write(&file, b"data").await.unwrap();

        let fake = Arc::new(FakeExecutor::new().with_probe("scene", ProbeReply::video(7.5).with_audio(false)));
        let probe = MetadataProbe::new(fake);

        let meta = probe.try_metadata(&file).await.unwrap();
        assert_eq!(meta.duration, 7.5);
        assert!(!meta.has_audio);
    }
}
