//! Recorder configuration
//!
//! Options recognized by the recording pipeline. Every key is optional in the
//! JSON form; missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default target encoder bitrate (12 Mbps)
pub const DEFAULT_VIDEO_BITS_PER_SECOND: u32 = 12_000_000;

/// Default surface sampling rate
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// Highest surface sampling rate accepted
pub const MAX_FRAME_RATE: u32 = 1000;

/// Default maximum time between emitted chunks
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 1000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Target encoder bitrate
    pub video_bits_per_second: u32,

    /// Surface sampling rate in frames per second
    pub frame_rate: u32,

    /// Maximum time between emitted chunks, in milliseconds
    pub chunk_interval_ms: u64,

    /// Encoding formats in descending priority
    pub preferred_formats: Vec<String>,

    /// Sample rate of the audio-processing context
    pub sample_rate: u32,

    /// Channel count of the mixed audio bus
    pub channels: u16,

    /// Run the optional finishing pass (seek index) on assembled artifacts
    pub seekable: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            video_bits_per_second: DEFAULT_VIDEO_BITS_PER_SECOND,
            frame_rate: DEFAULT_FRAME_RATE,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            preferred_formats: vec![
                "video/webm".to_string(),
                "video/webm;codecs=vp8".to_string(),
            ],
            sample_rate: 48_000,
            channels: 2,
            seekable: false,
        }
    }
}

impl RecorderConfig {
    /// Load and validate a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!("Loaded recorder config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_bits_per_second == 0 {
            return Err(ConfigError::Invalid("videoBitsPerSecond must be > 0".into()));
        }
        if self.frame_rate == 0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(ConfigError::Invalid(format!(
                "frameRate must be between 1 and {}",
                MAX_FRAME_RATE
            )));
        }
        if self.chunk_interval_ms == 0 {
            return Err(ConfigError::Invalid("chunkIntervalMs must be > 0".into()));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ConfigError::Invalid(
                "sampleRate and channels must be > 0".into(),
            ));
        }
        if self.preferred_formats.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "preferredFormats must name at least one format".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }
}
