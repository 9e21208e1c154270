//! Probe results for media files.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Duration reported when a file cannot be probed.
pub const FALLBACK_DURATION_SECS: f64 = 10.0;
/// Resolution reported when a file cannot be probed.
pub const FALLBACK_RESOLUTION: (u32, u32) = (1920, 1080);
/// Codec reported when a file cannot be probed.
pub const FALLBACK_CODEC: &str = "unknown";

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Primary video codec, or the audio codec for audio-only files
    pub codec: String,
    /// Whether at least one audio stream is present
    pub has_audio: bool,
}

impl MediaMetadata {
    /// Values used when probing fails.
    ///
    /// `has_audio` stays true: an unprobed file is treated as carrying
    /// its audio, so no stage replaces or drops a track it never saw.
    pub fn fallback() -> Self {
        Self {
            duration: FALLBACK_DURATION_SECS,
            width: FALLBACK_RESOLUTION.0,
            height: FALLBACK_RESOLUTION.1,
            codec: FALLBACK_CODEC.to_string(),
            has_audio: true,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for MediaMetadata {
    fn default() -> Self {
        Self::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_values() {
        let meta = MediaMetadata::fallback();
        assert_eq!(meta.duration, 10.0);
        assert_eq!(meta.resolution(), (1920, 1080));
        assert_eq!(meta.codec, "unknown");
        assert!(meta.has_audio);
    }
}
