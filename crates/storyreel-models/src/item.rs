//! Work items and their per-item results.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::stage::ItemState;

/// One (narration, footage, caption) unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkItem {
    /// Position in the manifest; all intermediate names derive from it
    pub index: usize,
    /// Narration audio; `None` means the clip is captioned without voice
    pub audio_path: Option<PathBuf>,
    pub source_video_path: PathBuf,
    pub caption_text: String,
    /// Preferred clip name
    pub output_clip_name: Option<String>,
}

impl WorkItem {
    pub fn new(index: usize, source_video_path: impl Into<PathBuf>, caption_text: impl Into<String>) -> Self {
        Self {
            index,
            audio_path: None,
            source_video_path: source_video_path.into(),
            caption_text: caption_text.into(),
            output_clip_name: None,
        }
    }

    pub fn with_audio(mut self, audio_path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(audio_path.into());
        self
    }

    pub fn with_clip_name(mut self, name: impl Into<String>) -> Self {
        self.output_clip_name = Some(name.into());
        self
    }

    /// File stem used for every file produced for this item.
    ///
    /// Always `{index:03}` followed by the sanitized clip name, so caption
    /// words never reach the filesystem.
    pub fn clip_stem(&self) -> String {
        let name = self
            .output_clip_name
            .as_deref()
            .map(sanitize_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "clip".to_string());
        format!("{:03}_{}", self.index, name)
    }

    /// Whether the source footage is present on disk.
    pub fn source_exists(&self) -> bool {
        self.source_video_path.is_file()
    }

    /// Whether narration audio is attached and present on disk.
    pub fn has_audio(&self) -> bool {
        self.audio_path.as_deref().is_some_and(Path::is_file)
    }
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Successful terminal result of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemResult {
    pub index: usize,
    pub clip_path: PathBuf,
    pub state: ItemState,
    /// True when either stage fell back to its input
    #[serde(default)]
    pub degraded: bool,
}

/// Item excluded from the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemFailure {
    pub index: usize,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}
