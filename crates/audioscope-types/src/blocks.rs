//! Blocks flowing through the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Anything carrying a point on the shared monotonic clock.
pub trait Timestamped {
    /// The instant this item belongs to.
    fn timestamp(&self) -> Instant;
}

impl<T: Timestamped + ?Sized> Timestamped for Arc<T> {
    fn timestamp(&self) -> Instant {
        (**self).timestamp()
    }
}

/// Duration of `samples` frames at `sample_rate`, at microsecond resolution.
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(samples * 1_000_000 / u64::from(sample_rate))
}

/// One batch of captured audio.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    /// Capture time of the first frame.
    pub t: Instant,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Channel count of `original_samples`.
    pub channels: u16,

    /// Per-frame sum of all channels.
    pub mono_samples: Vec<f32>,

    /// Interleaved samples as read from the source.
    pub original_samples: Vec<f32>,

    /// Set on the first block of each capture run. Samples before it belong
    /// to a different stream.
    pub discontinuity: bool,
}

impl SampleBlock {
    /// Number of frames in this block.
    pub fn frames(&self) -> usize {
        self.mono_samples.len()
    }

    /// Audio duration covered by this block.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.frames() as u64, self.sample_rate)
    }
}

impl Timestamped for SampleBlock {
    fn timestamp(&self) -> Instant {
        self.t
    }
}

/// Magnitude spectrum of one analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBlock {
    /// Time of the first sample in the window.
    pub t: Instant,

    /// Normalized magnitudes, `size / 2 + 1` bins from DC to Nyquist.
    pub magnitudes: Vec<f64>,

    /// Frequency of the last bin in Hz.
    pub fmax: f32,
}

impl SpectrumBlock {
    /// Centre frequency of bin `index` in Hz.
    pub fn bin_frequency(&self, index: usize) -> f32 {
        match self.magnitudes.len() {
            0 | 1 => 0.0,
            n => self.fmax * index as f32 / (n - 1) as f32,
        }
    }
}

impl Timestamped for SpectrumBlock {
    fn timestamp(&self) -> Instant {
        self.t
    }
}

/// Signal level over one level window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBlock {
    /// Time of the first sample in the window.
    pub t: Instant,

    /// RMS of the window.
    pub curr: f32,

    /// Highest RMS among the most recent windows.
    pub recent_peak: f32,
}

impl Timestamped for LevelBlock {
    fn timestamp(&self) -> Instant {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_to_duration() {
        assert_eq!(samples_to_duration(480, 48_000), Duration::from_millis(10));
        assert_eq!(samples_to_duration(4_800, 48_000), Duration::from_millis(100));
        assert_eq!(samples_to_duration(1, 0), Duration::ZERO);
    }

    #[test]
    fn test_bin_frequency_spans_dc_to_nyquist() {
        let block = SpectrumBlock {
            t: Instant::now(),
            magnitudes: vec![0.0; 2049],
            fmax: 24_000.0,
        };
        assert_eq!(block.bin_frequency(0), 0.0);
        assert_eq!(block.bin_frequency(2048), 24_000.0);
        assert_eq!(block.bin_frequency(1024), 12_000.0);
    }
}
