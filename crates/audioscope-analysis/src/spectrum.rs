//! Sliding-window magnitude spectrum.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use audioscope_types::{samples_to_duration, SampleBlock, SpectrumBlock};

use crate::error::AnalysisError;
use crate::{AnalysisResult, Analyzer};

const BLACKMAN_HARRIS: [f64; 4] = [0.3635819, 0.4891775, 0.1365995, 0.0106411];

/// Four-term Blackman-Harris window of length `size`.
pub fn blackman_harris(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    let [a0, a1, a2, a3] = BLACKMAN_HARRIS;
    let denom = (size - 1) as f64;
    (0..size)
        .map(|n| {
            let x = 2.0 * PI * n as f64 / denom;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos() - a3 * (3.0 * x).cos()
        })
        .collect()
}

/// Emits the windowed magnitude spectrum of the last `size` samples every
/// `period_ms` of audio.
///
/// Magnitudes are divided by the window's DC gain, so a full-scale constant
/// input reads 1.0 in bin 0 whatever the window. Hops longer than the
/// transform skip the samples in between without buffering them.
pub struct StreamingSpectrum {
    size: usize,
    period_ms: u32,
    window: Vec<f64>,
    normalization: f64,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
    frame: Vec<Complex<f64>>,

    sample_rate: u32,
    shift: usize,
    buffer: Vec<f32>,
    /// Timestamp of the block the analyzer last resynced on.
    origin: Option<Instant>,
    /// Samples from `origin` to the first buffered sample.
    position: u64,
    remainder: usize,
}

impl StreamingSpectrum {
    /// Create an analyzer with transform size `size` and hop `period_ms`.
    pub fn new(size: usize, period_ms: u32) -> AnalysisResult<Self> {
        if size < 2 {
            return Err(AnalysisError::InvalidSize(size));
        }
        if period_ms == 0 {
            return Err(AnalysisError::InvalidPeriod);
        }

        let window = blackman_harris(size);
        let normalization = window.iter().sum();
        let fft = FftPlanner::new().plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        Ok(Self {
            size,
            period_ms,
            window,
            normalization,
            fft,
            scratch,
            frame: vec![Complex::default(); size],
            sample_rate: 0,
            shift: 1,
            buffer: Vec::with_capacity(size * 2),
            origin: None,
            position: 0,
            remainder: 0,
        })
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of magnitude bins per emitted block.
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Hop size in samples at the current rate.
    pub fn shift(&self) -> usize {
        self.shift
    }

    fn resync(&mut self, block: &SampleBlock) {
        debug!(
            sample_rate = block.sample_rate,
            size = self.size,
            discontinuity = block.discontinuity,
            "Spectrum analyzer resync"
        );
        self.sample_rate = block.sample_rate;
        let shift = u64::from(self.period_ms) * u64::from(block.sample_rate) / 1000;
        self.shift = (shift as usize).max(1);
        self.buffer.clear();
        self.remainder = 0;
        self.origin = Some(block.t);
        self.position = 0;
    }

    /// Feed one block, appending any completed spectra to `out`.
    pub fn process(&mut self, block: &SampleBlock, out: &mut Vec<SpectrumBlock>) {
        if self.origin.is_none() || block.discontinuity || block.sample_rate != self.sample_rate
        {
            self.resync(block);
        }
        let Some(origin) = self.origin else {
            return;
        };

        let samples = &block.mono_samples;
        if self.remainder >= samples.len() {
            self.remainder -= samples.len();
            self.position += samples.len() as u64;
            return;
        }

        self.position += self.remainder as u64;
        self.buffer.extend_from_slice(&samples[self.remainder..]);
        self.remainder = 0;

        while self.buffer.len() >= self.size {
            out.push(SpectrumBlock {
                t: origin + samples_to_duration(self.position, self.sample_rate),
                magnitudes: self.transform(),
                fmax: self.sample_rate as f32 / 2.0,
            });

            if self.shift < self.buffer.len() {
                self.buffer.drain(..self.shift);
                self.position += self.shift as u64;
            } else {
                self.remainder = self.shift - self.buffer.len();
                self.position += self.buffer.len() as u64;
                self.buffer.clear();
                break;
            }
        }
    }

    /// Magnitudes of the first `size` buffered samples.
    fn transform(&mut self) -> Vec<f64> {
        for ((slot, &sample), &w) in self
            .frame
            .iter_mut()
            .zip(self.buffer.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(f64::from(sample) * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.frame, &mut self.scratch);

        self.frame[..self.bins()]
            .iter()
            .map(|c| c.norm() / self.normalization)
            .collect()
    }
}

impl fmt::Debug for StreamingSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSpectrum")
            .field("size", &self.size)
            .field("period_ms", &self.period_ms)
            .field("sample_rate", &self.sample_rate)
            .field("buffered", &self.buffer.len())
            .field("remainder", &self.remainder)
            .finish()
    }
}

impl Analyzer for StreamingSpectrum {
    type Output = SpectrumBlock;

    fn process(&mut self, block: &SampleBlock, out: &mut Vec<SpectrumBlock>) {
        StreamingSpectrum::process(self, block, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn mono_block(t: Instant, sample_rate: u32, samples: Vec<f32>) -> SampleBlock {
        SampleBlock {
            t,
            sample_rate,
            channels: 1,
            original_samples: samples.clone(),
            mono_samples: samples,
            discontinuity: false,
        }
    }

    fn feed(
        spectrum: &mut StreamingSpectrum,
        t0: Instant,
        rate: u32,
        samples: &[f32],
        chunk: usize,
    ) -> Vec<SpectrumBlock> {
        let mut out = Vec::new();
        for (i, part) in samples.chunks(chunk).enumerate() {
            let t = t0 + samples_to_duration((i * chunk) as u64, rate);
            spectrum.process(&mono_block(t, rate, part.to_vec()), &mut out);
        }
        out
    }

    fn tone(freq: f64, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f64 / f64::from(rate)).sin() as f32)
            .collect()
    }

    #[test]
    fn test_window_is_symmetric_and_peaks_at_centre() {
        let w = blackman_harris(9);
        assert_relative_eq!(w[0], w[8], epsilon = 1e-12);
        assert_relative_eq!(w[4], 1.0, epsilon = 1e-6);
        assert_relative_eq!(w[0], 0.0003628, epsilon = 1e-7);
    }

    #[test]
    fn test_constant_input_reads_unity_at_dc() {
        let mut spectrum = StreamingSpectrum::new(256, 10).unwrap();
        let out = feed(&mut spectrum, Instant::now(), 8000, &[1.0; 256], 64);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].magnitudes.len(), 129);
        assert_relative_eq!(out[0].magnitudes[0], 1.0, epsilon = 1e-9);
        assert!(out[0].magnitudes[10..].iter().all(|&m| m < 1e-4));
        assert_eq!(out[0].fmax, 4000.0);
    }

    #[test]
    fn test_tone_lands_in_its_bin() {
        let rate = 8192;
        let mut spectrum = StreamingSpectrum::new(1024, 50).unwrap();
        // 512 Hz is exactly bin 64 at 8 Hz per bin.
        let out = feed(&mut spectrum, Instant::now(), rate, &tone(512.0, rate, 1024), 256);

        assert_eq!(out.len(), 1);
        let peak = out[0]
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
        assert_relative_eq!(out[0].bin_frequency(peak), 512.0, epsilon = 1e-3);
        // A unit sine splits its energy between the two half-spectra.
        assert_relative_eq!(out[0].magnitudes[64], 0.5, max_relative = 1e-3);
    }

    #[test]
    fn test_identical_input_is_bit_identical() {
        let rate = 48_000;
        let samples = tone(440.0, rate, 20_000);
        let t0 = Instant::now();

        let a = feed(&mut StreamingSpectrum::new(4096, 25).unwrap(), t0, rate, &samples, 480);
        let b = feed(&mut StreamingSpectrum::new(4096, 25).unwrap(), t0, rate, &samples, 480);

        assert!(!a.is_empty());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.t, y.t);
            assert_eq!(x.magnitudes, y.magnitudes);
        }
    }

    #[test]
    fn test_overlapping_hops_are_spaced_by_period() {
        let rate = 48_000;
        let t0 = Instant::now();
        let mut spectrum = StreamingSpectrum::new(4096, 25).unwrap();
        assert_eq!(spectrum.bins(), 2049);

        let out = feed(&mut spectrum, t0, rate, &vec![0.0; 4096 + 3 * 1200], 480);

        assert_eq!(spectrum.shift(), 1200);
        assert_eq!(out.len(), 4);
        for (i, block) in out.iter().enumerate() {
            assert_eq!(block.t, t0 + Duration::from_millis(25 * i as u64));
        }
    }

    #[test]
    fn test_long_hop_skips_samples() {
        let rate = 1000;
        let t0 = Instant::now();
        // 16-sample transform, 100-sample hop.
        let mut spectrum = StreamingSpectrum::new(16, 100).unwrap();

        let out = feed(&mut spectrum, t0, rate, &vec![0.0; 250], 10);

        let times: Vec<_> = out.iter().map(|b| b.t).collect();
        assert_eq!(
            times,
            vec![
                t0,
                t0 + Duration::from_millis(100),
                t0 + Duration::from_millis(200)
            ]
        );
    }

    #[test]
    fn test_rate_change_resyncs() {
        let t0 = Instant::now();
        let mut spectrum = StreamingSpectrum::new(64, 10).unwrap();
        let mut out = Vec::new();

        // Not enough for a transform at the first rate.
        spectrum.process(&mono_block(t0, 8000, vec![1.0; 40]), &mut out);
        assert!(out.is_empty());

        let t1 = t0 + Duration::from_secs(1);
        spectrum.process(&mono_block(t1, 4000, vec![0.0; 40]), &mut out);
        assert!(out.is_empty());
        spectrum.process(&mono_block(t1 + Duration::from_millis(10), 4000, vec![0.0; 40]), &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].t, t1);
        assert_eq!(out[0].fmax, 2000.0);
        // Only zeros from the new rate were analysed.
        assert!(out[0].magnitudes.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(matches!(
            StreamingSpectrum::new(1, 25),
            Err(AnalysisError::InvalidSize(1))
        ));
        assert!(matches!(
            StreamingSpectrum::new(64, 0),
            Err(AnalysisError::InvalidPeriod)
        ));
    }

    #[test]
    fn test_discontinuity_drops_previous_run() {
        let rate = 48_000;
        let t0 = Instant::now();
        let mut spectrum = StreamingSpectrum::new(4096, 25).unwrap();

        let old_run = feed(&mut spectrum, t0, rate, &vec![1.0; 15 * 480], 480);
        assert_eq!(old_run.len(), 3);

        let t1 = t0 + Duration::from_secs(10);
        let mut out = Vec::new();
        for i in 0..10 {
            let mut block = mono_block(
                t1 + samples_to_duration(i * 480, rate),
                rate,
                vec![0.0; 480],
            );
            block.discontinuity = i == 0;
            spectrum.process(&block, &mut out);
        }

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].t, t1);
        assert!(out[0].magnitudes.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_hop_timestamps_do_not_drift() {
        // 25 ms at 44.1 kHz is 1102 samples, or 24988.66 µs per hop.
        let rate = 44_100;
        let t0 = Instant::now();
        let mut spectrum = StreamingSpectrum::new(256, 25).unwrap();
        assert_eq!(spectrum.shift(), 1102);

        let out = feed(&mut spectrum, t0, rate, &vec![0.0; 1102 * 2000], 441);

        assert_eq!(out.len(), 2000);
        assert_eq!(out[1999].t, t0 + samples_to_duration(1999 * 1102, rate));
    }
}
