//! Caption placement and styling.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Default caption font size
pub const DEFAULT_FONT_SIZE: u32 = 24;
/// Default caption font color
pub const DEFAULT_FONT_COLOR: &str = "white";
/// Default background box color
pub const DEFAULT_BOX_COLOR: &str = "black@0.5";
/// Default background box border width
pub const DEFAULT_BOX_BORDER: u32 = 5;
/// Default wrap width in characters
pub const DEFAULT_MAX_CHARS_PER_LINE: usize = 40;
/// Vertical margin used by top/bottom placement
pub const EDGE_MARGIN: u32 = 50;

/// Where a caption is drawn on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    #[default]
    Bottom,
    #[serde(alias = "middle")]
    Center,
}

impl CaptionPosition {
    /// drawtext `x=..:y=..` expression for this placement.
    pub fn coordinates(&self) -> String {
        match self {
            CaptionPosition::Top => format!("x=(w-text_w)/2:y={}", EDGE_MARGIN),
            CaptionPosition::Bottom => format!("x=(w-text_w)/2:y=h-th-{}", EDGE_MARGIN),
            CaptionPosition::Center => "x=(w-text_w)/2:y=(h-text_h)/2".to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionPosition::Top => "top",
            CaptionPosition::Bottom => "bottom",
            CaptionPosition::Center => "center",
        }
    }
}

impl fmt::Display for CaptionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptionPosition {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(CaptionPosition::Top),
            "bottom" => Ok(CaptionPosition::Bottom),
            "center" | "middle" => Ok(CaptionPosition::Center),
            other => Err(ModelError::UnknownPosition(other.to_string())),
        }
    }
}

/// Caption rendering style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    #[serde(default = "default_font_color")]
    pub font_color: String,

    /// Background box color (ffmpeg color syntax, alpha allowed)
    #[serde(default = "default_box_color")]
    pub box_color: String,

    #[serde(default = "default_box_border")]
    pub box_border: u32,

    #[serde(default)]
    pub position: CaptionPosition,

    /// Lines are wrapped at this many characters
    #[serde(default = "default_max_chars_per_line")]
    pub max_chars_per_line: usize,
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}
fn default_font_color() -> String {
    DEFAULT_FONT_COLOR.to_string()
}
fn default_box_color() -> String {
    DEFAULT_BOX_COLOR.to_string()
}
fn default_box_border() -> u32 {
    DEFAULT_BOX_BORDER
}
fn default_max_chars_per_line() -> usize {
    DEFAULT_MAX_CHARS_PER_LINE
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            font_color: DEFAULT_FONT_COLOR.to_string(),
            box_color: DEFAULT_BOX_COLOR.to_string(),
            box_border: DEFAULT_BOX_BORDER,
            position: CaptionPosition::default(),
            max_chars_per_line: DEFAULT_MAX_CHARS_PER_LINE,
        }
    }
}

impl CaptionStyle {
    pub fn with_position(mut self, position: CaptionPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_font_size(mut self, font_size: u32) -> Self {
        self.font_size = font_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_parse_accepts_middle_alias() {
        assert_eq!("middle".parse::<CaptionPosition>().unwrap(), CaptionPosition::Center);
        assert_eq!("TOP".parse::<CaptionPosition>().unwrap(), CaptionPosition::Top);
        assert!("left".parse::<CaptionPosition>().is_err());
    }

    #[test]
    fn test_position_coordinates() {
        assert_eq!(CaptionPosition::Bottom.coordinates(), "x=(w-text_w)/2:y=h-th-50");
        assert_eq!(CaptionPosition::Top.coordinates(), "x=(w-text_w)/2:y=50");
        assert_eq!(CaptionPosition::Center.coordinates(), "x=(w-text_w)/2:y=(h-text_h)/2");
    }

    #[test]
    fn test_style_serde_defaults() {
        let style: CaptionStyle = serde_json::from_str(r#"{"position":"middle"}"#).unwrap();
        assert_eq!(style.position, CaptionPosition::Center);
        assert_eq!(style.font_size, 24);
        assert_eq!(style.max_chars_per_line, 40);
        assert_eq!(style.box_color, "black@0.5");
    }
}
