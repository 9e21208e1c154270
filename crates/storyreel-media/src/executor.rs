//! Bounded-concurrency runner for external tool invocations.
//!
//! Every process the pipeline starts goes through a single
//! [`ProcessExecutor`]. It holds one semaphore, so the number of live
//! child processes never exceeds its capacity no matter how many items or
//! stages are in flight. Stages never hold a permit themselves; only the
//! executor acquires one, right before spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::command::{Tool, ToolCommand};
use crate::error::{MediaError, MediaResult};
use crate::telemetry;

/// Default number of concurrent tool processes.
pub const DEFAULT_MAX_PROCESSES: usize = 4;
/// Extension added to output paths that have none.
pub const DEFAULT_OUTPUT_EXTENSION: &str = "mp4";
/// Directory for output paths given as a bare file name.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Lines of stderr kept on failure.
const STDERR_TAIL_LINES: usize = 20;

/// What a finished invocation produced.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// Normalized output path, when the command wrote a file
    pub output: Option<PathBuf>,
}

impl ToolOutput {
    /// The written file, or an error for commands without an output.
    pub fn into_output_path(self) -> MediaResult<PathBuf> {
        self.output
            .ok_or_else(|| MediaError::internal("command did not declare an output path"))
    }
}

/// Seam between media stages and process spawning.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command to completion. Non-zero exit is an error carrying
    /// the exit code and captured stderr.
    async fn execute(&self, command: ToolCommand) -> MediaResult<ToolOutput>;
}

/// Locations of the external binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub yt_dlp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            yt_dlp: PathBuf::from("yt-dlp"),
        }
    }
}

impl ToolPaths {
    pub fn path_for(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
            Tool::YtDlp => &self.yt_dlp,
        }
    }

    /// Resolve every tool, failing on the first one that is missing.
    pub fn verify(&self) -> MediaResult<Vec<(Tool, PathBuf)>> {
        [Tool::Ffmpeg, Tool::Ffprobe, Tool::YtDlp]
            .into_iter()
            .map(|tool| {
                which::which(self.path_for(tool))
                    .map(|resolved| (tool, resolved))
                    .map_err(|_| MediaError::tool_not_found(tool.as_str()))
            })
            .collect()
    }
}

/// Output path normalization applied before any tool writes a file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPolicy {
    pub default_dir: PathBuf,
    pub default_extension: String,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            default_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
        }
    }
}

impl OutputPolicy {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
            ..Default::default()
        }
    }

    /// Add the default extension when missing and place bare file names
    /// under the default directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = if has_parent(path) {
            path.to_path_buf()
        } else {
            self.default_dir.join(path)
        };
        if resolved.extension().is_none() {
            resolved.set_extension(&self.default_extension);
        }
        resolved
    }

    /// Resolve and create the parent directory.
    pub async fn prepare(&self, path: &Path) -> MediaResult<PathBuf> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(resolved)
    }
}

fn has_parent(path: &Path) -> bool {
    path.parent().is_some_and(|p| !p.as_os_str().is_empty())
}

/// Spawns tool processes under a shared concurrency limit.
pub struct ProcessExecutor {
    tools: ToolPaths,
    policy: OutputPolicy,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(max_processes: usize) -> Self {
        Self {
            tools: ToolPaths::default(),
            policy: OutputPolicy::default(),
            semaphore: Arc::new(Semaphore::new(max_processes.max(1))),
            timeout: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Kill any single invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Check that all configured tools resolve.
    pub fn verify_tools(&self) -> MediaResult<()> {
        for (tool, path) in self.tools.verify()? {
            debug!(tool = %tool, path = %path.display(), "Resolved external tool");
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: ToolCommand) -> MediaResult<ToolOutput> {
        let tool = command.tool();

        let output = match command.output_path() {
            Some(path) => Some(self.policy.prepare(path).await?),
            None => None,
        };
        let command = match output.clone() {
            Some(path) => command.with_resolved_output(path),
            None => command,
        };

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MediaError::internal("executor semaphore closed"))?;

        let args = command.build_args();
        let program = self.tools.path_for(tool);
        debug!(tool = %tool, "Running {} {}", program.display(), args.join(" "));

        let started = Instant::now();
        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::tool_not_found(tool.as_str()),
                _ => MediaError::Io(e),
            })?;

        let wait = child.wait_with_output();
        let result = match self.timeout {
            // Dropping the wait future kills the child.
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(tool = %tool, timeout_ms = limit.as_millis() as u64, "Tool timed out, killing process");
                    telemetry::record_tool_run(tool, started.elapsed(), false);
                    return Err(MediaError::Timeout {
                        tool: tool.to_string(),
                        millis: limit.as_millis() as u64,
                    });
                }
            },
            None => wait.await?,
        };

        let success = result.status.success();
        telemetry::record_tool_run(tool, started.elapsed(), success);

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();

        if !success {
            let tail = stderr_tail(&stderr);
            warn!(
                tool = %tool,
                exit_code = ?result.status.code(),
                stderr = %tail,
                "Tool exited with non-zero status"
            );
            return Err(MediaError::tool_failed(
                tool.as_str(),
                "exited with non-zero status",
                Some(tail),
                result.status.code(),
            ));
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            output,
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
