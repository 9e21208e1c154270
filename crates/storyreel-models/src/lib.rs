//! Shared data models for the StoryReel media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Work items and the ordered narration manifest
//! - Probe metadata with documented fallbacks
//! - Caption styling and placement
//! - External audio requests
//! - Normalization (encoding) profiles
//! - Stage outcomes and per-item state

pub mod caption;
pub mod encoding;
pub mod error;
pub mod external_audio;
pub mod item;
pub mod manifest;
pub mod media;
pub mod stage;

// Re-export common types
pub use caption::{CaptionPosition, CaptionStyle};
pub use encoding::NormalizationProfile;
pub use error::{ModelError, ModelResult};
pub use external_audio::{parse_clock_time, ExternalAudioSpec};
pub use item::{ItemFailure, ItemResult, WorkItem};
pub use manifest::{Manifest, ManifestEntry};
pub use media::MediaMetadata;
pub use stage::{ItemState, StageOutcome};
