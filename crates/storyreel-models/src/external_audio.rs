//! External (remote) audio mixed onto a finished video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Volume used when the requested one is out of range.
pub const FALLBACK_VOLUME: f64 = 1.0;

/// Request to lay remote audio under a video.
///
/// Built per concatenation request and consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalAudioSpec {
    /// Remote audio location (anything the downloader understands)
    pub url: String,

    /// Seconds into the base video where the external audio becomes audible
    #[serde(default)]
    pub start_time: f64,

    /// Seconds cut from the start of the downloaded audio
    #[serde(default)]
    pub trim_lead_seconds: f64,

    /// Mix volume in `[0.0, 1.0]`
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    FALLBACK_VOLUME
}

impl ExternalAudioSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            start_time: 0.0,
            trim_lead_seconds: 0.0,
            volume: FALLBACK_VOLUME,
        }
    }

    pub fn with_start_time(mut self, seconds: f64) -> Self {
        self.start_time = seconds;
        self
    }

    pub fn with_trim(mut self, seconds: f64) -> Self {
        self.trim_lead_seconds = seconds;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Volume to apply and whether the requested one had to be replaced.
    pub fn effective_volume(&self) -> (f64, bool) {
        if (0.0..=1.0).contains(&self.volume) {
            (self.volume, false)
        } else {
            (FALLBACK_VOLUME, true)
        }
    }

    /// Reject URLs that cannot be parsed.
    pub fn validate(&self) -> ModelResult<()> {
        url::Url::parse(&self.url)
            .map(|_| ())
            .map_err(|e| ModelError::InvalidUrl {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }
}

/// Parse `"SS"`, `"M:SS"` or `"H:MM:SS"` into seconds.
pub fn parse_clock_time(value: &str) -> ModelResult<f64> {
    let value = value.trim();
    let invalid = || ModelError::InvalidClockTime(value.to_string());

    if value.is_empty() {
        return Err(invalid());
    }

    let mut total = 0.0;
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }

    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        let n: f64 = part.trim().parse().map_err(|_| invalid())?;
        if !n.is_finite() || n < 0.0 {
            return Err(invalid());
        }
        // leading fields must be whole numbers, inner fields below 60
        if !is_last && n.fract() != 0.0 {
            return Err(invalid());
        }
        if i > 0 && n >= 60.0 {
            return Err(invalid());
        }
        total = total * 60.0 + n;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("0:30").unwrap(), 30.0);
        assert_eq!(parse_clock_time("1:05").unwrap(), 65.0);
        assert_eq!(parse_clock_time("45").unwrap(), 45.0);
        assert_eq!(parse_clock_time("1:00:00").unwrap(), 3600.0);
        assert_eq!(parse_clock_time("2.5").unwrap(), 2.5);
    }

    #[test]
    fn test_parse_clock_time_rejects_garbage() {
        assert!(parse_clock_time("").is_err());
        assert!(parse_clock_time("a:10").is_err());
        assert!(parse_clock_time("1:75").is_err());
        assert!(parse_clock_time("-3").is_err());
        assert!(parse_clock_time("1:2:3:4").is_err());
    }

    #[test]
    fn test_effective_volume() {
        let spec = ExternalAudioSpec::new("https://example.com/a").with_volume(0.3);
        assert_eq!(spec.effective_volume(), (0.3, false));

        let loud = spec.clone().with_volume(1.7);
        assert_eq!(loud.effective_volume(), (1.0, true));

        let nan = spec.with_volume(f64::NAN);
        assert_eq!(nan.effective_volume(), (1.0, true));
    }

    #[test]
    fn test_validate_url() {
        assert!(ExternalAudioSpec::new("https://www.youtube.com/watch?v=abc").validate().is_ok());
        assert!(ExternalAudioSpec::new("not a url").validate().is_err());
    }
}
