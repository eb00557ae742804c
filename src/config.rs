use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Parameters of the enhancement pass run before the second decode attempt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Adaptive threshold neighbourhood side length, odd, in pixels
    pub block_size: u32,
    /// Subtracted from the local weighted mean before comparing
    pub bias: i32,
    /// Radius of the square structuring element used for opening/closing
    pub morph_radius: u32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            block_size: 41,
            bias: 20,
            morph_radius: 1,
        }
    }
}

/// Everything the scanner core needs to know up front.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Side length of the square image the classifier consumes
    pub model_input_size: u32,
    /// Detections must score strictly above this to be decoded
    pub confidence_threshold: f32,
    /// Pixels added on every side of a detection before cropping
    pub region_padding: u32,
    /// How often the result cache is cleared
    pub eviction_period_ms: u64,
    /// Upper bound on classifier outputs per frame
    pub max_detections: usize,
    /// Detection cycles allowed to run at the same time
    pub max_in_flight: usize,
    /// Frames allowed to wait for a free worker before intake starts skipping
    pub queue_depth: usize,
    pub enhance: EnhanceConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            model_input_size: 300,
            confidence_threshold: 0.1,
            region_padding: 50,
            eviction_period_ms: 3000,
            max_detections: 10,
            max_in_flight: 2,
            queue_depth: 4,
            enhance: EnhanceConfig::default(),
        }
    }
}

impl ScannerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ScannerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn eviction_period(&self) -> Duration {
        Duration::from_millis(self.eviction_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_input_size == 0 {
            return Err(ScanError::Config("model_input_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ScanError::Config(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.eviction_period_ms == 0 {
            return Err(ScanError::Config("eviction_period_ms must be positive".into()));
        }
        if self.max_detections == 0 {
            return Err(ScanError::Config("max_detections must be positive".into()));
        }
        if self.max_in_flight == 0 || self.queue_depth == 0 {
            return Err(ScanError::Config(
                "max_in_flight and queue_depth must be positive".into(),
            ));
        }
        let block = self.enhance.block_size;
        if block < 3 || block % 2 == 0 {
            return Err(ScanError::Config(format!(
                "enhance.block_size must be odd and at least 3, got {block}"
            )));
        }
        if self.enhance.morph_radius > u8::MAX as u32 {
            return Err(ScanError::Config(format!(
                "enhance.morph_radius must be at most 255, got {}",
                self.enhance.morph_radius
            )));
        }
        Ok(())
    }
}
