//! Stage outcomes and per-item processing state.

use std::fmt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of a single media stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage produced a new file.
    Success(PathBuf),
    /// The stage failed and handed back its input unchanged.
    Degraded(PathBuf),
    /// The stage failed and has nothing usable.
    Failed,
}

impl StageOutcome {
    /// Usable path, whether fresh or fallen back.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StageOutcome::Success(p) | StageOutcome::Degraded(p) => Some(p),
            StageOutcome::Failed => None,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            StageOutcome::Success(p) | StageOutcome::Degraded(p) => Some(p),
            StageOutcome::Failed => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded(_))
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Success(_) => "success",
            StageOutcome::Degraded(_) => "degraded",
            StageOutcome::Failed => "failed",
        }
    }
}

/// Per-item lifecycle: `Pending -> Merging -> Captioning -> Done`.
///
/// `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Pending,
    Merging,
    Captioning,
    Done,
    Failed,
}

impl ItemState {
    /// Next state on the happy path. Terminal states stay put.
    pub fn advance(self) -> Self {
        match self {
            ItemState::Pending => ItemState::Merging,
            ItemState::Merging => ItemState::Captioning,
            ItemState::Captioning => ItemState::Done,
            ItemState::Done => ItemState::Done,
            ItemState::Failed => ItemState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Done | ItemState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Merging => "merging",
            ItemState::Captioning => "captioning",
            ItemState::Done => "done",
            ItemState::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
