//! Short-window RMS level meter.

use std::time::Instant;

use tracing::debug;

use audioscope_types::{samples_to_duration, LevelBlock, SampleBlock};

use crate::Analyzer;

/// Number of past RMS values considered for the peak indicator.
pub const PEAK_BACKLOG: usize = 32;

/// Computes the RMS of consecutive fixed-length windows of the mono stream.
///
/// Windows are counted in audio time, so levels are emitted at a steady
/// cadence no matter how the input is chunked. A fresh stream (empty buffer,
/// a new sample rate or a capture discontinuity) re-bases timestamps on the
/// incoming block.
pub struct StreamingLevel {
    period_ms: u32,
    sample_rate: u32,
    buffer: Vec<f32>,
    /// Timestamp of the block the meter last resynced on.
    origin: Option<Instant>,
    /// Samples consumed since `origin`.
    position: u64,
    backlog: [f32; PEAK_BACKLOG],
    backlog_index: usize,
}

impl StreamingLevel {
    /// Create a meter emitting one level per `period_ms` of audio.
    pub fn new(period_ms: u32) -> Self {
        Self {
            period_ms: period_ms.max(1),
            sample_rate: 0,
            buffer: Vec::new(),
            origin: None,
            position: 0,
            backlog: [0.0; PEAK_BACKLOG],
            backlog_index: 0,
        }
    }

    /// Samples per level window at the current rate.
    pub fn window(&self) -> usize {
        let window = u64::from(self.sample_rate) * u64::from(self.period_ms) / 1000;
        (window as usize).max(1)
    }

    /// Largest of the recent RMS values.
    pub fn recent_peak(&self) -> f32 {
        self.backlog.iter().copied().fold(0.0, f32::max)
    }

    /// Feed one block, appending any completed levels to `out`.
    pub fn process(&mut self, block: &SampleBlock, out: &mut Vec<LevelBlock>) {
        let origin = match self.origin {
            Some(origin)
                if !block.discontinuity
                    && !self.buffer.is_empty()
                    && self.sample_rate == block.sample_rate =>
            {
                origin
            }
            _ => {
                if block.discontinuity || self.sample_rate != block.sample_rate {
                    debug!(
                        sample_rate = block.sample_rate,
                        discontinuity = block.discontinuity,
                        "Level meter resync"
                    );
                }
                self.sample_rate = block.sample_rate;
                self.buffer.clear();
                self.origin = Some(block.t);
                self.position = 0;
                block.t
            }
        };
        self.buffer.extend_from_slice(&block.mono_samples);

        let window = self.window();
        let mut consumed = 0usize;
        while self.buffer.len() - consumed >= window {
            let samples = &self.buffer[consumed..consumed + window];
            let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
            let rms = (sum / window as f64).sqrt() as f32;

            self.backlog[self.backlog_index] = rms;
            self.backlog_index = (self.backlog_index + 1) % PEAK_BACKLOG;

            out.push(LevelBlock {
                t: origin + samples_to_duration(self.position, self.sample_rate),
                curr: rms,
                recent_peak: self.recent_peak(),
            });

            consumed += window;
            self.position += window as u64;
        }

        self.buffer.drain(..consumed);
    }
}

impl Default for StreamingLevel {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Analyzer for StreamingLevel {
    type Output = LevelBlock;

    fn process(&mut self, block: &SampleBlock, out: &mut Vec<LevelBlock>) {
        StreamingLevel::process(self, block, out);
    }
}
