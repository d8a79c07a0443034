//! Engine and device configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent with another value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How raw device samples are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Two's complement signed integers.
    SignedInt,

    /// Offset-binary unsigned integers.
    UnsignedInt,

    /// IEEE 754 floating point.
    Float,
}

/// Capture device selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSelection {
    /// Device name (None for the default input device).
    pub device: Option<String>,

    /// Number of interleaved channels to capture.
    pub channels: u16,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Raw sample encoding.
    pub encoding: SampleEncoding,

    /// Bits per raw sample.
    pub bits: u16,

    /// Linear gain applied after conversion.
    pub gain: f32,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self {
            device: None,
            channels: 2,
            sample_rate: 48_000,
            encoding: SampleEncoding::Float,
            bits: 32,
            gain: 1.0,
        }
    }
}

/// Where captured audio is mirrored to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// Discard audio; the clock follows wall time.
    #[default]
    Null,

    /// Play through an output device (None for the default device).
    Device { name: Option<String> },
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio time covered by one level block.
    pub level_period_ms: u32,

    /// Spectrum transform size in samples.
    pub spectrum_size: usize,

    /// Hop between spectrum windows.
    pub spectrum_period_ms: u32,

    /// Target output device buffering.
    pub output_latency_ms: u32,

    /// Overflow above which buffered output is discarded.
    pub drop_threshold_ms: u32,

    /// Latency reported by the null sink clock.
    pub null_sink_latency_ms: u32,

    /// Longest a source read waits before reporting an empty block.
    pub source_poll_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level_period_ms: 100,
            spectrum_size: 4096,
            spectrum_period_ms: 25,
            output_latency_ms: 100,
            drop_threshold_ms: 500,
            null_sink_latency_ms: 0,
            source_poll_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Check ranges and the latency/drop coupling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_period_ms == 0 {
            return Err(ConfigError::Invalid("level_period_ms must be non-zero".into()));
        }
        if self.spectrum_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "spectrum_period_ms must be non-zero".into(),
            ));
        }
        if self.spectrum_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "spectrum_size must be at least 2, got {}",
                self.spectrum_size
            )));
        }
        if self.source_poll_ms == 0 {
            return Err(ConfigError::Invalid("source_poll_ms must be non-zero".into()));
        }
        // A threshold below one buffer's worth of audio drops during normal playback.
        if self.drop_threshold_ms < self.output_latency_ms {
            return Err(ConfigError::Invalid(format!(
                "drop_threshold_ms ({}) is below output_latency_ms ({})",
                self.drop_threshold_ms, self.output_latency_ms
            )));
        }
        Ok(())
    }
}
