//! Scripted executor for tests.
//!
//! [`FakeExecutor`] never spawns a process. It records every command,
//! answers ffprobe with scripted JSON, writes a small placeholder file
//! for ffmpeg and yt-dlp outputs, and fails any command matching a
//! registered rule.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::command::{Tool, ToolCommand};
use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, OutputPolicy, ToolOutput};

/// Bytes written for every fake output file.
pub const FAKE_MEDIA_BYTES: &[u8] = b"fake-media";

/// Scripted ffprobe answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReply {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub has_video: bool,
    pub has_audio: bool,
}

impl ProbeReply {
    /// Video with an audio track.
    pub fn video(duration: f64) -> Self {
        Self {
            duration,
            width: 1280,
            height: 720,
            has_video: true,
            has_audio: true,
        }
    }

    /// Audio-only file.
    pub fn audio(duration: f64) -> Self {
        Self {
            duration,
            width: 0,
            height: 0,
            has_video: false,
            has_audio: true,
        }
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    fn to_json(&self) -> String {
        let mut streams = Vec::new();
        if self.has_video {
            streams.push(serde_json::json!({
                "codec_type": "video",
                "codec_name": "h264",
                "width": self.width,
                "height": self.height,
            }));
        }
        if self.has_audio {
            streams.push(serde_json::json!({"codec_type": "audio", "codec_name": "aac"}));
        }
        serde_json::json!({
            "streams": streams,
            "format": {"duration": format!("{:.6}", self.duration)},
        })
        .to_string()
    }
}

/// In-memory [`CommandExecutor`].
pub struct FakeExecutor {
    policy: OutputPolicy,
    default_probe: ProbeReply,
    probes: Vec<(String, ProbeReply)>,
    failures: Vec<(Tool, String)>,
    delay: Option<Duration>,
    limit: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<ToolCommand>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            policy: OutputPolicy::default(),
            default_probe: ProbeReply::video(10.0),
            probes: Vec::new(),
            failures: Vec::new(),
            delay: None,
            limit: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reply used when no path-specific reply matches.
    pub fn with_default_probe(mut self, reply: ProbeReply) -> Self {
        self.default_probe = reply;
        self
    }

    /// Reply for probed paths containing `needle`. First match wins.
    pub fn with_probe(mut self, needle: impl Into<String>, reply: ProbeReply) -> Self {
        self.probes.push((needle.into(), reply));
        self
    }

    /// Fail every `tool` command whose arguments or output contain `needle`.
    pub fn fail_when(mut self, tool: Tool, needle: impl Into<String>) -> Self {
        self.failures.push((tool, needle.into()));
        self
    }

    /// Hold each command for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Admit at most `max` commands at once, like [`crate::ProcessExecutor`].
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Every command received, in arrival order, with resolved outputs.
    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, tool: Tool) -> Vec<ToolCommand> {
        self.calls().into_iter().filter(|c| c.tool() == tool).collect()
    }

    /// Ffmpeg commands whose arguments contain `needle`.
    pub fn ffmpeg_calls_mentioning(&self, needle: &str) -> Vec<ToolCommand> {
        self.calls_for(Tool::Ffmpeg)
            .into_iter()
            .filter(|c| c.mentions(needle))
            .collect()
    }

    /// Highest number of commands observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn probe_reply(&self, path: &str) -> &ProbeReply {
        self.probes
            .iter()
            .find(|(needle, _)| path.contains(needle.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_probe)
    }

    async fn answer(&self, command: &ToolCommand) -> MediaResult<ToolOutput> {
        let tool = command.tool();
        if self
            .failures
            .iter()
            .any(|(t, needle)| *t == tool && command.mentions(needle))
        {
            return Err(MediaError::tool_failed(
                tool.as_str(),
                "scripted failure",
                Some("scripted failure".to_string()),
                Some(1),
            ));
        }

        match tool {
            Tool::Ffprobe => {
                let target = command.arguments().last().cloned().unwrap_or_default();
                Ok(ToolOutput {
                    stdout: self.probe_reply(&target).to_json(),
                    ..Default::default()
                })
            }
            Tool::Ffmpeg => {
                let output = command.output_path().map(Path::to_path_buf);
                if let Some(path) = &output {
                    write_placeholder(path).await?;
                }
                Ok(ToolOutput {
                    output,
                    ..Default::default()
                })
            }
            Tool::YtDlp => {
                let template = command
                    .value_of("-o")
                    .ok_or_else(|| MediaError::invalid_input("yt-dlp command without -o"))?;
                let path = PathBuf::from(template.replace("%(ext)s", "mp3"));
                write_placeholder(&path).await?;
                Ok(ToolOutput::default())
            }
        }
    }
}

async fn write_placeholder(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, FAKE_MEDIA_BYTES).await?;
    Ok(())
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, command: ToolCommand) -> MediaResult<ToolOutput> {
        let command = match command.output_path() {
            Some(path) => {
                let resolved = self.policy.prepare(path).await?;
                command.with_resolved_output(resolved)
            }
            None => command,
        };

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let _permit = match &self.limit {
            Some(limit) => Some(
                limit
                    .acquire()
                    .await
                    .map_err(|_| MediaError::internal("fake executor limit closed"))?,
            ),
            None => None,
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.answer(&command).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
