//! Normalization profile shared by every concatenation input.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Preset used when normalizing individual clips
pub const DEFAULT_NORMALIZE_PRESET: &str = "fast";
/// Preset used for the final concatenation pass
pub const DEFAULT_CONCAT_PRESET: &str = "medium";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 22;
/// Default output frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Default audio sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
/// Default pixel format
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Target encoding every clip is brought to before concatenation.
///
/// The keyframe interval always equals the frame rate so each second
/// starts on a keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizationProfile {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_normalize_preset")]
    pub normalize_preset: String,

    #[serde(default = "default_concat_preset")]
    pub concat_preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_normalize_preset() -> String {
    DEFAULT_NORMALIZE_PRESET.to_string()
}
fn default_concat_preset() -> String {
    DEFAULT_CONCAT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for NormalizationProfile {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            normalize_preset: default_normalize_preset(),
            concat_preset: default_concat_preset(),
            crf: DEFAULT_CRF,
            frame_rate: DEFAULT_FRAME_RATE,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            pixel_format: default_pixel_format(),
        }
    }
}

impl NormalizationProfile {
    /// Keyframe interval in frames.
    pub fn gop_size(&self) -> u32 {
        self.frame_rate
    }

    /// Video encoding arguments with the given preset.
    pub fn video_args(&self, preset: &str) -> Vec<String> {
        let gop = self.gop_size().to_string();
        vec![
            "-c:v".into(),
            self.video_codec.clone(),
            "-preset".into(),
            preset.to_string(),
            "-crf".into(),
            self.crf.to_string(),
            "-r".into(),
            self.frame_rate.to_string(),
            "-g".into(),
            gop.clone(),
            "-keyint_min".into(),
            gop,
            "-fps_mode".into(),
            "cfr".into(),
            "-pix_fmt".into(),
            self.pixel_format.clone(),
        ]
    }

    /// Audio encoding arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".into(),
            self.audio_codec.clone(),
            "-b:a".into(),
            self.audio_bitrate.clone(),
            "-ar".into(),
            self.sample_rate.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = NormalizationProfile::default();
        assert_eq!(profile.frame_rate, 30);
        assert_eq!(profile.gop_size(), 30);
        assert_eq!(profile.crf, 22);
        assert_eq!(profile.sample_rate, 48_000);
    }

    #[test]
    fn test_video_args_pin_gop_to_frame_rate() {
        let profile = NormalizationProfile {
            frame_rate: 25,
            ..Default::default()
        };
        let args = profile.video_args("fast");
        let g = args.iter().position(|a| a == "-g").unwrap();
        assert_eq!(args[g + 1], "25");
        let k = args.iter().position(|a| a == "-keyint_min").unwrap();
        assert_eq!(args[k + 1], "25");
        assert!(args.contains(&"fast".to_string()));
    }
}
