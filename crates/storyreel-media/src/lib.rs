#![deny(unreachable_patterns)]
//! Process wrapper and media stages for the StoryReel pipeline.
//!
//! This crate provides:
//! - A bounded-concurrency executor for ffmpeg, ffprobe and yt-dlp
//! - Metadata probing with documented fallbacks
//! - Narration merge and timed caption overlay stages
//! - Two-pass normalize-then-concat
//! - External audio download, looping and gated mixing
//!
//! Every stage reports a [`StageOutcome`]; failures inside a stage are
//! converted at its boundary and never propagate as errors.

pub mod caption;
pub mod command;
pub mod concat;
pub mod download;
pub mod error;
pub mod executor;
pub mod external_audio;
pub mod fallback;
pub mod filters;
pub mod fs_utils;
pub mod merge;
pub mod probe;
pub mod stages;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use caption::CaptionOverlay;
pub use command::{Tool, ToolCommand};
pub use concat::{ConcatTarget, Concatenator};
pub use download::AudioDownloader;
pub use error::{MediaError, MediaResult};
pub use executor::{CommandExecutor, OutputPolicy, ProcessExecutor, ToolOutput, ToolPaths};
pub use external_audio::ExternalAudioMerger;
pub use fallback::attempt_with_fallback;
pub use merge::AudioVideoMerger;
pub use probe::MetadataProbe;
pub use stages::{CaptionStage, ConcatStage, ExternalAudioStage, MergeStage};

pub use storyreel_models::StageOutcome;
