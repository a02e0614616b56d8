//! Router configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! The gain, settle delay and poll interval are tuned for typical phone
//! hardware and can be adjusted per device.

use crate::platform::CaptureFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration service error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Tunable router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Wait after writing output routing flags
    pub settle_delay_ms: u64,

    /// Multiplier applied to the raw input level before clamping
    pub level_gain: f32,

    /// Level monitor sampling interval
    pub poll_interval_ms: u64,

    /// Capture sample rate in Hz (mono, 16-bit)
    pub sample_rate: u32,

    /// Microphone volume ceiling before the user sets one
    pub default_mic_volume: f32,

    /// Fraction of the ceiling above which a reading counts as hot
    pub hot_ratio: f32,

    /// `tracing` filter directive, e.g. "debug" or "audio_router_rs=trace"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            level_gain: 1000.0,
            poll_interval_ms: 100,
            sample_rate: 44_100,
            default_mic_volume: 0.5,
            hot_ratio: 0.8,
            log_level: None,
        }
    }
}

impl RouterConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.level_gain.is_finite() && self.level_gain > 0.0) {
            return Err(invalid("level_gain", "must be a positive number"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.default_mic_volume) {
            return Err(invalid("default_mic_volume", "must be within 0.0..=1.0"));
        }
        if !(0.0..=1.0).contains(&self.hot_ratio) {
            return Err(invalid("hot_ratio", "must be within 0.0..=1.0"));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat::mono_pcm16(self.sample_rate)
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = RouterConfig::from_json("{}").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.capture_format(), CaptureFormat::mono_pcm16(44_100));
    }

    #[test]
    fn test_partial_override() {
        let config =
            RouterConfig::from_json(r#"{"level_gain": 250.0, "log_level": "debug"}"#).unwrap();
        assert_eq!(config.level_gain, 250.0);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RouterConfig::from_json(r#"{"poll_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "poll_interval_ms", .. }));

        let err = RouterConfig::from_json(r#"{"level_gain": -1.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "level_gain", .. }));

        assert!(matches!(
            RouterConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = RouterConfig::load("/nonexistent/audio-router.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
