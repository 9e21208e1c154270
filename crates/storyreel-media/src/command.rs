//! Structured command builder for the external media tools.
//!
//! Commands are argument vectors, never shell strings. For tools that
//! write a file the output path is kept apart from the arguments and is
//! always appended last, after the executor has normalized it.

use std::fmt;
use std::path::{Path, PathBuf};

/// External tools the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    YtDlp,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::YtDlp => "yt-dlp",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for tool invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    tool: Tool,
    args: Vec<String>,
    output: Option<PathBuf>,
}

impl ToolCommand {
    /// Bare command with no preset arguments.
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            output: None,
        }
    }

    /// FFmpeg command that overwrites its output and only logs errors.
    pub fn ffmpeg() -> Self {
        Self::new(Tool::Ffmpeg).args(["-y", "-hide_banner", "-v", "error"])
    }

    /// FFprobe command emitting JSON.
    pub fn ffprobe() -> Self {
        Self::new(Tool::Ffprobe).args(["-v", "error", "-of", "json"])
    }

    pub fn yt_dlp() -> Self {
        Self::new(Tool::YtDlp)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an input file (`-i <path>`).
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.arg("-i").arg(path_arg(path.as_ref()))
    }

    /// Add a path as a plain argument.
    pub fn path(self, path: impl AsRef<Path>) -> Self {
        self.arg(path_arg(path.as_ref()))
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.arg("-filter_complex").arg(filter)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.arg("-vf").arg(filter)
    }

    pub fn map(self, spec: impl Into<String>) -> Self {
        self.arg("-map").arg(spec)
    }

    /// Set the file this invocation writes.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Replace the output with its normalized form.
    pub fn with_resolved_output(mut self, path: PathBuf) -> Self {
        self.output = Some(path);
        self
    }

    /// Final argument vector; the output path, if any, is last.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(output) = &self.output {
            args.push(path_arg(output));
        }
        args
    }

    /// Whether any argument contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a.contains(needle))
            || self
                .output
                .as_ref()
                .is_some_and(|o| o.to_string_lossy().contains(needle))
    }

    /// Whether `flag` is immediately followed by `value` anywhere.
    pub fn has_pair(&self, flag: &str, value: &str) -> bool {
        self.args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tool, self.build_args().join(" "))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::ffmpeg()
            .input("video.mp4")
            .input("voice.mp3")
            .map("0:v")
            .map("1:a")
            .args(["-c:v", "copy", "-shortest"])
            .output("out.mp4");

        let args = cmd.build_args();
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(cmd.value_of("-c:v"), Some("copy"));
        assert_eq!(cmd.tool(), Tool::Ffmpeg);
    }

    #[test]
    fn test_output_stays_last_after_resolution() {
        let cmd = ToolCommand::ffmpeg()
            .output("clip")
            .arg("-an")
            .with_resolved_output(PathBuf::from("/work/clip.mp4"));

        let args = cmd.build_args();
        assert_eq!(args.last().map(String::as_str), Some("/work/clip.mp4"));
        assert_eq!(args[args.len() - 2], "-an");
    }

    #[test]
    fn test_probe_has_no_output() {
        let cmd = ToolCommand::ffprobe().path("in.mp4");
        assert!(cmd.output_path().is_none());
        assert_eq!(cmd.build_args().last().map(String::as_str), Some("in.mp4"));
    }
}
