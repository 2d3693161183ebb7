//! Pattern-generator configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::WalkingPatternGenerator;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("preview window must contain at least one interval")]
    EmptyPreviewWindow,

    #[error("sampling period must be > 0 ms")]
    ZeroSamplingPeriod,

    #[error("invalid {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Timing and geometry of the walking pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WpgConfig {
    /// Preview window length in sampling intervals (default: 15).
    #[serde(default = "default_preview_len")]
    pub preview_len: usize,

    /// Sampling period in milliseconds (default: 100).
    #[serde(default = "default_sampling_period_ms")]
    pub sampling_period_ms: u32,

    /// Swing-foot apex height in meters (default: 0.02).
    #[serde(default = "default_step_height")]
    pub step_height: f64,

    /// CoM height above the ground in meters (default: 0.26).
    #[serde(default = "default_com_height")]
    pub com_height: f64,
}

const fn default_preview_len() -> usize {
    15
}
const fn default_sampling_period_ms() -> u32 {
    100
}
const fn default_step_height() -> f64 {
    0.02
}
const fn default_com_height() -> f64 {
    0.26
}

impl Default for WpgConfig {
    fn default() -> Self {
        Self {
            preview_len: default_preview_len(),
            sampling_period_ms: default_sampling_period_ms(),
            step_height: default_step_height(),
            com_height: default_com_height(),
        }
    }
}

impl WpgConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_len == 0 {
            return Err(ConfigError::EmptyPreviewWindow);
        }
        if self.sampling_period_ms == 0 {
            return Err(ConfigError::ZeroSamplingPeriod);
        }
        if self.step_height < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "step_height",
                message: format!("{} must be >= 0", self.step_height),
            });
        }
        if self.com_height <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "com_height",
                message: format!("{} must be > 0", self.com_height),
            });
        }
        Ok(())
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

impl WalkingPatternGenerator {
    /// Build a generator from a validated configuration.
    pub fn from_config(config: &WpgConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.preview_len,
            config.sampling_period_ms,
            config.step_height,
        ))
    }
}
