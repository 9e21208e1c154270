//! Burned-in captions, split into timed segments.
//!
//! Longer captions are split into up to three segments by word count and
//! shown one after another. The clip duration is divided evenly, and
//! segment `i` of `n` is visible over `[i*d/n, (i+1)*d/n)`. The last
//! window is left open so it holds through the final frame even when the
//! probed duration is slightly short.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyreel_models::{CaptionStyle, StageOutcome};
use tracing::{debug, info};

use crate::command::ToolCommand;
use crate::executor::CommandExecutor;
use crate::fallback::attempt_with_fallback;
use crate::filters::{escape_filter_text, window_expr};
use crate::probe::MetadataProbe;
use crate::telemetry;

const STAGE: &str = "caption";

/// Captions up to this many characters are one segment.
const SINGLE_SEGMENT_MAX_CHARS: usize = 30;
/// Captions up to this many characters are two segments.
const DOUBLE_SEGMENT_MAX_CHARS: usize = 50;

/// Number of segments for a caption.
pub fn segment_count(text: &str) -> usize {
    match text.chars().count() {
        n if n <= SINGLE_SEGMENT_MAX_CHARS => 1,
        n if n <= DOUBLE_SEGMENT_MAX_CHARS => 2,
        _ => 3,
    }
}

/// Split words into `n` groups of `len / n`; the last group takes the
/// remainder. Groups may be empty when there are fewer words than groups.
pub fn split_segments(text: &str, n: usize) -> Vec<String> {
    let n = n.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = words.len() / n;

    (0..n)
        .map(|i| {
            let start = i * size;
            let end = if i == n - 1 { words.len() } else { (i + 1) * size };
            words[start..end].join(" ")
        })
        .collect()
}

/// Windows partitioning `[0, duration)`. The last end is `None` (open).
pub fn segment_windows(duration: f64, n: usize) -> Vec<(f64, Option<f64>)> {
    let n = n.max(1);
    let step = duration / n as f64;
    (0..n)
        .map(|i| {
            let start = step * i as f64;
            let end = if i == n - 1 { None } else { Some(step * (i + 1) as f64) };
            (start, end)
        })
        .collect()
}

/// Greedy word wrap. Words longer than `max_chars` are broken.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// drawtext filters for every non-empty segment, comma-joined.
///
/// Returns `None` when there is nothing to draw.
pub fn build_caption_filter(text: &str, duration: f64, style: &CaptionStyle) -> Option<String> {
    let n = segment_count(text);
    let segments = split_segments(text, n);
    let windows = segment_windows(duration, n);

    let filters: Vec<String> = segments
        .iter()
        .zip(windows)
        .filter(|(segment, _)| !segment.is_empty())
        .map(|(segment, (start, end))| {
            let wrapped = wrap_text(segment, style.max_chars_per_line).join("\n");
            let mut filter = format!(
                "drawtext=text={}:expansion=none:fontsize={}:fontcolor={}:box=1:boxcolor={}:boxborderw={}:{}",
                escape_filter_text(&wrapped),
                style.font_size,
                style.font_color,
                style.box_color,
                style.box_border,
                style.position.coordinates(),
            );
            if n > 1 {
                filter.push_str(&format!(":enable='{}'", window_expr(start, end)));
            }
            filter
        })
        .collect();

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

/// Keep a caption word from becoming the output name: when the output stem
/// equals the caption's first word, prefix the file name with `captioned_`.
pub fn guard_output_name(output: &Path, caption: &str) -> PathBuf {
    let first_word = caption.split_whitespace().next();
    let stem = output.file_stem().map(|s| s.to_string_lossy());
    match (first_word, stem, output.file_name()) {
        (Some(word), Some(stem), Some(name)) if stem == word => {
            output.with_file_name(format!("captioned_{}", name.to_string_lossy()))
        }
        _ => output.to_path_buf(),
    }
}

/// Draws timed caption segments onto a clip.
#[derive(Clone)]
pub struct CaptionOverlay {
    executor: Arc<dyn CommandExecutor>,
    probe: MetadataProbe,
    style: CaptionStyle,
}

impl CaptionOverlay {
    pub fn new(executor: Arc<dyn CommandExecutor>, style: CaptionStyle) -> Self {
        Self {
            probe: MetadataProbe::new(executor.clone()),
            executor,
            style,
        }
    }

    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    /// Burn `caption` into `input`. Failure yields `Degraded(input)`.
    pub async fn overlay(&self, input: &Path, caption: &str, output: &Path) -> StageOutcome {
        let duration = self.probe.duration(input).await;

        let filter = match build_caption_filter(caption, duration, &self.style) {
            Some(filter) => filter,
            None => {
                debug!(input = %input.display(), "Empty caption, nothing to draw");
                let outcome = StageOutcome::Degraded(input.to_path_buf());
                telemetry::record_stage_outcome(STAGE, &outcome);
                return outcome;
            }
        };

        let output = guard_output_name(output, caption);
        let command = ToolCommand::ffmpeg()
            .input(input)
            .video_filter(filter)
            .args(["-c:v", "libx264", "-preset", "fast", "-crf", "22", "-c:a", "copy"])
            .output(output);

        let executor = self.executor.clone();
        let outcome = attempt_with_fallback(STAGE, input, async move {
            executor.execute(command).await?.into_output_path()
        })
        .await;

        if let StageOutcome::Success(path) = &outcome {
            info!(
                output = %path.display(),
                segments = segment_count(caption),
                duration,
                "Captioned clip"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Tool;
    use crate::testing::{FakeExecutor, ProbeReply};
    use storyreel_models::CaptionPosition;
    use tempfile::TempDir;

    #[test]
    fn test_segment_count_thresholds() {
        assert_eq!(segment_count(&"a".repeat(30)), 1);
        assert_eq!(segment_count(&"a".repeat(31)), 2);
        assert_eq!(segment_count(&"a".repeat(50)), 2);
        assert_eq!(segment_count(&"a".repeat(51)), 3);
        assert_eq!(segment_count(""), 1);
    }

    #[test]
    fn test_split_segments_remainder_goes_last() {
        let segments = split_segments("one two three four five six seven", 3);
        assert_eq!(segments, vec!["one two", "three four", "five six seven"]);
    }

    #[test]
    fn test_split_segments_fewer_words_than_segments() {
        let segments = split_segments("supercalifragilistic expialidocious", 3);
        assert_eq!(segments, vec!["", "", "supercalifragilistic expialidocious"]);
    }

    #[test]
    fn test_windows_partition_duration() {
        for n in 1..=3 {
            let d = 9.0;
            let windows = segment_windows(d, n);
            assert_eq!(windows.len(), n);
            assert_eq!(windows[0].0, 0.0);
            for pair in windows.windows(2) {
                assert_eq!(pair[0].1, Some(pair[1].0), "windows must be contiguous");
            }
            assert_eq!(windows[n - 1].1, None);
            assert!((windows[n - 1].0 - d * (n - 1) as f64 / n as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("  ", 10), Vec::<String>::new());
    }

    #[test]
    fn test_single_segment_filter_is_ungated() {
        let style = CaptionStyle::default();
        let filter = build_caption_filter("Short line", 6.0, &style).unwrap();
        assert!(!filter.contains("enable="));
        assert!(filter.contains("text='Short line'"));
        assert!(filter.contains("y=h-th-50"));
        assert!(filter.contains("expansion=none"));
    }

    #[test]
    fn test_three_segment_filter_windows() {
        let style = CaptionStyle::default().with_position(CaptionPosition::Top);
        let text = "The river ran quietly past the sleeping town under a silver moon tonight";
        let filter = build_caption_filter(text, 9.0, &style).unwrap();

        assert_eq!(filter.matches("drawtext=").count(), 3);
        assert!(filter.contains("enable='gte(t,0.000)*lt(t,3.000)'"));
        assert!(filter.contains("enable='gte(t,3.000)*lt(t,6.000)'"));
        assert!(filter.contains("enable='gte(t,6.000)'"));
        assert!(filter.contains("y=50"));
    }

    #[test]
    fn test_filter_escapes_special_characters() {
        let style = CaptionStyle::default();
        let filter = build_caption_filter("It's 5:00", 4.0, &style).unwrap();
        assert!(filter.contains(r"text='It\'\''s 5\:00'"));
    }

    #[test]
    fn test_guard_output_name() {
        assert_eq!(
            guard_output_name(Path::new("/out/Hello.mp4"), "Hello world"),
            PathBuf::from("/out/captioned_Hello.mp4")
        );
        assert_eq!(
            guard_output_name(Path::new("/out/001_intro.mp4"), "Hello world"),
            PathBuf::from("/out/001_intro.mp4")
        );
    }

    #[tokio::test]
    async fn test_overlay_runs_drawtext() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("merged.mp4");
        tokio::fs::write(&input, b"v").await.unwrap();
        let output = dir.path().join("final.mp4");

        let fake = Arc::new(FakeExecutor::new().with_default_probe(ProbeReply::video(8.0)));
        let overlay = CaptionOverlay::new(fake.clone(), CaptionStyle::default());

        let outcome = overlay
            .overlay(&input, "A caption long enough to need two segments", &output)
            .await;
        assert_eq!(outcome, StageOutcome::Success(output));

        let calls = fake.calls_for(Tool::Ffmpeg);
        assert_eq!(calls.len(), 1);
        let vf = calls[0].value_of("-vf").unwrap();
        assert_eq!(vf.matches("drawtext=").count(), 2);
        assert!(vf.contains("lt(t,4.000)"));
    }

    #[tokio::test]
    async fn test_overlay_failure_degrades_to_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("merged.mp4");
        tokio::fs::write(&input, b"v").await.unwrap();

        let fake = Arc::new(FakeExecutor::new().fail_when(Tool::Ffmpeg, "drawtext"));
        let overlay = CaptionOverlay::new(fake, CaptionStyle::default());

        let outcome = overlay.overlay(&input, "Hello", &dir.path().join("out.mp4")).await;
        assert_eq!(outcome, StageOutcome::Degraded(input));
    }

    #[tokio::test]
    async fn test_empty_caption_skips_tool() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("merged.mp4");
        tokio::fs::write(&input, b"v").await.unwrap();

        let fake = Arc::new(FakeExecutor::new());
        let overlay = CaptionOverlay::new(fake.clone(), CaptionStyle::default());

        let outcome = overlay.overlay(&input, "   ", &dir.path().join("out.mp4")).await;
        assert_eq!(outcome, StageOutcome::Degraded(input));
        assert!(fake.calls_for(Tool::Ffmpeg).is_empty());
    }
}
