//! Worker configuration.
//!
//! Read once from `STORYREEL_*` environment variables (after `.env` is
//! loaded) and passed to constructors; nothing reads the environment
//! after startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use storyreel_media::executor::DEFAULT_MAX_PROCESSES;
use storyreel_media::{OutputPolicy, ProcessExecutor, ToolPaths};
use storyreel_models::{parse_clock_time, CaptionPosition, CaptionStyle, ExternalAudioSpec};

use crate::error::{WorkerError, WorkerResult};

const PREFIX: &str = "STORYREEL_";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent tool processes (ffmpeg, ffprobe, yt-dlp)
    pub max_ffmpeg_processes: usize,
    pub tools: ToolPaths,
    /// Per-invocation kill timeout
    pub tool_timeout: Option<Duration>,
    /// Scratch space and default directory for bare output names
    pub work_dir: PathBuf,
    /// Root for per-project final outputs
    pub output_root: PathBuf,
    /// Where manifest audio names are resolved
    pub audio_dir: PathBuf,
    /// Where manifest source videos are resolved
    pub videos_dir: PathBuf,
    pub caption_style: CaptionStyle,
    /// Concurrent synthesis calls in the first pass
    pub synth_max_workers: usize,
    /// Sequential attempts per item in the retry pass
    pub synth_max_retries: u32,
    /// External audio mixed under every final video
    pub external_audio: Option<ExternalAudioSpec>,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_ffmpeg_processes: DEFAULT_MAX_PROCESSES,
            tools: ToolPaths::default(),
            tool_timeout: None,
            work_dir: PathBuf::from("./output"),
            output_root: PathBuf::from("./data/media/output"),
            audio_dir: PathBuf::from("data/current"),
            videos_dir: PathBuf::from("data/media/videos"),
            caption_style: CaptionStyle::default(),
            synth_max_workers: 4,
            synth_max_retries: 3,
            external_audio: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup (keys include the prefix).
    ///
    /// Unparseable numbers fall back to defaults; an invalid caption
    /// position, clock time or metrics address is a configuration error.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let mut caption_style = CaptionStyle::default();
        if let Some(size) = get("FONT_SIZE").and_then(|s| s.parse().ok()) {
            caption_style.font_size = size;
        }
        if let Some(position) = get("CAPTION_POSITION") {
            caption_style.position = position
                .parse::<CaptionPosition>()
                .map_err(|e| WorkerError::config_error(e.to_string()))?;
        }
        if let Some(chars) = get("MAX_CHARS_PER_LINE").and_then(|s| s.parse().ok()) {
            caption_style.max_chars_per_line = chars;
        }

        let external_audio = match get("EXTERNAL_AUDIO_URL") {
            Some(url) => {
                let mut spec = ExternalAudioSpec::new(url);
                if let Some(start) = get("EXTERNAL_AUDIO_START") {
                    spec.start_time = parse_clock_time(&start)
                        .map_err(|e| WorkerError::config_error(e.to_string()))?;
                }
                if let Some(trim) = get("EXTERNAL_AUDIO_TRIM") {
                    spec.trim_lead_seconds = parse_clock_time(&trim)
                        .map_err(|e| WorkerError::config_error(e.to_string()))?;
                }
                if let Some(volume) = get("EXTERNAL_AUDIO_VOLUME").and_then(|s| s.parse().ok()) {
                    spec.volume = volume;
                }
                spec.validate()
                    .map_err(|e| WorkerError::config_error(e.to_string()))?;
                Some(spec)
            }
            None => None,
        };

        let metrics_addr = match get("METRICS_ADDR") {
            Some(addr) => Some(addr.parse().map_err(|_| {
                WorkerError::config_error(format!("invalid {PREFIX}METRICS_ADDR '{}'", addr))
            })?),
            None => None,
        };

        Ok(Self {
            max_ffmpeg_processes: get("MAX_FFMPEG")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_ffmpeg_processes),
            tools: ToolPaths {
                ffmpeg: get("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.tools.ffmpeg),
                ffprobe: get("FFPROBE_PATH").map(PathBuf::from).unwrap_or(defaults.tools.ffprobe),
                yt_dlp: get("YTDLP_PATH").map(PathBuf::from).unwrap_or(defaults.tools.yt_dlp),
            },
            tool_timeout: get("TOOL_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            work_dir: get("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            output_root: get("OUTPUT_ROOT").map(PathBuf::from).unwrap_or(defaults.output_root),
            audio_dir: get("AUDIO_DIR").map(PathBuf::from).unwrap_or(defaults.audio_dir),
            videos_dir: get("VIDEOS_DIR").map(PathBuf::from).unwrap_or(defaults.videos_dir),
            caption_style,
            synth_max_workers: get("SYNTH_MAX_WORKERS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.synth_max_workers),
            synth_max_retries: get("SYNTH_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.synth_max_retries),
            external_audio,
            metrics_addr,
        })
    }

    /// Process executor honoring the concurrency limit, tool paths and
    /// timeout from this config.
    pub fn build_executor(&self) -> ProcessExecutor {
        let executor = ProcessExecutor::new(self.max_ffmpeg_processes)
            .with_tools(self.tools.clone())
            .with_output_policy(OutputPolicy::new(&self.work_dir));
        match self.tool_timeout {
            Some(timeout) => executor.with_timeout(timeout),
            None => executor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_ffmpeg_processes, 4);
        assert_eq!(config.caption_style.font_size, 24);
        assert_eq!(config.caption_style.position, CaptionPosition::Bottom);
        assert_eq!(config.work_dir, PathBuf::from("./output"));
        assert!(config.external_audio.is_none());
        assert!(config.tool_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("STORYREEL_MAX_FFMPEG", "2"),
            ("STORYREEL_CAPTION_POSITION", "middle"),
            ("STORYREEL_TOOL_TIMEOUT_SECS", "600"),
            ("STORYREEL_FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("STORYREEL_EXTERNAL_AUDIO_URL", "https://www.youtube.com/watch?v=abc"),
            ("STORYREEL_EXTERNAL_AUDIO_START", "1:05"),
            ("STORYREEL_EXTERNAL_AUDIO_VOLUME", "0.25"),
        ]))
        .unwrap();

        assert_eq!(config.max_ffmpeg_processes, 2);
        assert_eq!(config.caption_style.position, CaptionPosition::Center);
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));

        let spec = config.external_audio.unwrap();
        assert_eq!(spec.start_time, 65.0);
        assert_eq!(spec.volume, 0.25);
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("STORYREEL_MAX_FFMPEG", "lots"),
            ("STORYREEL_SYNTH_MAX_WORKERS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.max_ffmpeg_processes, 4);
        assert_eq!(config.synth_max_workers, 4);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = WorkerConfig::from_lookup(lookup(&[("STORYREEL_CAPTION_POSITION", "left")])).unwrap_err();
        assert!(err.is_fatal());

        let err = WorkerConfig::from_lookup(lookup(&[
            ("STORYREEL_EXTERNAL_AUDIO_URL", "https://example.com/a"),
            ("STORYREEL_EXTERNAL_AUDIO_START", "soon"),
        ]))
        .unwrap_err();
        assert!(err.is_fatal());

        assert!(WorkerConfig::from_lookup(lookup(&[("STORYREEL_METRICS_ADDR", "nowhere")])).is_err());
    }
}
