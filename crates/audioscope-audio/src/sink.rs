//! Output sinks and the presentation clock.
//!
//! A sink receives every captured block from the pump and reports, through
//! its clock, the capture-time position of the audio currently leaving the
//! output. The clock is a separate shared handle because consumers read it
//! from their own threads while the pump thread owns the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use audioscope_types::samples_to_duration;

use crate::AudioResult;

/// Counters describing audio discarded by a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    /// Number of times buffered output was discarded.
    pub events: u64,

    /// Total duration discarded.
    pub dropped: Duration,
}

/// Read-only view of a sink's playback position.
pub trait SinkClock: Send + Sync {
    /// Estimated capture time of the audio currently audible.
    fn time(&self) -> Instant;

    /// Audio discarded so far.
    fn drops(&self) -> DropStats {
        DropStats::default()
    }
}

/// Shared handle to a sink clock.
pub type SharedClock = Arc<dyn SinkClock>;

/// Destination for captured audio.
pub trait OutputSink: Send {
    /// Open the output.
    fn start(&mut self) -> AudioResult<()>;

    /// Close the output. Safe to call when already stopped.
    fn stop(&mut self);

    /// Handle for reading the playback position from other threads.
    fn clock(&self) -> SharedClock;

    /// Current playback position.
    fn time(&self) -> Instant {
        self.clock().time()
    }

    /// Queue interleaved samples for playback.
    fn write_samples(&mut self, samples: &[f32]) -> AudioResult<()>;
}

/// Clock of a sink without an output device.
pub struct NullClock {
    latency: Duration,
}

impl SinkClock for NullClock {
    fn time(&self) -> Instant {
        Instant::now() + self.latency
    }
}

/// Sink that discards audio while keeping the clock moving.
pub struct NullSink {
    clock: Arc<NullClock>,
}

impl NullSink {
    /// Create a sink whose clock runs `latency` ahead of now.
    pub fn new(latency: Duration) -> Self {
        Self {
            clock: Arc::new(NullClock { latency }),
        }
    }
}

impl OutputSink for NullSink {
    fn start(&mut self) -> AudioResult<()> {
        debug!("Null sink started");
        Ok(())
    }

    fn stop(&mut self) {}

    fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn write_samples(&mut self, _samples: &[f32]) -> AudioResult<()> {
        Ok(())
    }
}

/// Frames consumed by a playback device, shared with its callback.
#[derive(Debug)]
pub struct PlaybackPosition {
    frames: AtomicU64,
    sample_rate: u32,
}

impl PlaybackPosition {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Record `frames` more frames as played.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Audio time played so far.
    pub fn elapsed(&self) -> Duration {
        samples_to_duration(self.frames(), self.sample_rate)
    }
}

/// A device that plays interleaved `f32` samples from a bounded buffer.
pub trait PlaybackDevice: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Open the device and start playback.
    fn start(&mut self) -> AudioResult<()>;

    /// Stop playback and release the device.
    fn stop(&mut self);

    /// Queue as many samples as fit; returns how many were accepted.
    fn write(&mut self, samples: &[f32]) -> usize;

    /// Delay introduced by the device buffer.
    fn buffer_delay(&self) -> Duration;

    /// Counter advanced as the device plays.
    fn position(&self) -> Arc<PlaybackPosition>;
}

#[derive(Debug)]
struct ClockState {
    t0: Instant,
    buffer_delay: Duration,
    overflow_delay: Duration,
    dropped: Duration,
    drop_events: u64,
}

/// Clock of a device-backed sink.
///
/// `t0 + played - (device buffer + overflow) + dropped`, read as one
/// snapshot under the lock.
pub struct DeviceClock {
    state: RwLock<ClockState>,
    position: Arc<PlaybackPosition>,
}

impl SinkClock for DeviceClock {
    fn time(&self) -> Instant {
        let state = self.state.read();
        let played = self.position.elapsed();
        (state.t0 + played + state.dropped)
            .checked_sub(state.buffer_delay + state.overflow_delay)
            .unwrap_or(state.t0)
    }

    fn drops(&self) -> DropStats {
        let state = self.state.read();
        DropStats {
            events: state.drop_events,
            dropped: state.dropped,
        }
    }
}

/// Sink that plays through a device, dropping audio it cannot keep up with.
///
/// Samples the device cannot accept are kept in an overflow buffer and
/// retried on the next write. Once the overflow plus the incoming block
/// reaches the drop threshold, both are discarded and their duration is
/// added to the clock so it keeps tracking the captured timeline.
pub struct DeviceSink<P: PlaybackDevice> {
    device: P,
    channels: usize,
    sample_rate: u32,
    drop_samples: usize,
    overflow: Vec<f32>,
    clock: Arc<DeviceClock>,
}

impl<P: PlaybackDevice> DeviceSink<P> {
    /// Wrap a device, dropping once `drop_threshold` of audio is pending.
    pub fn new(device: P, drop_threshold: Duration) -> Self {
        let channels = usize::from(device.channels().max(1));
        let sample_rate = device.sample_rate();
        let drop_frames =
            (drop_threshold.as_micros() * u128::from(sample_rate) / 1_000_000) as usize;

        let clock = Arc::new(DeviceClock {
            state: RwLock::new(ClockState {
                t0: Instant::now(),
                buffer_delay: device.buffer_delay(),
                overflow_delay: Duration::ZERO,
                dropped: Duration::ZERO,
                drop_events: 0,
            }),
            position: device.position(),
        });

        Self {
            device,
            channels,
            sample_rate,
            drop_samples: drop_frames * channels,
            overflow: Vec::new(),
            clock,
        }
    }

    /// Samples waiting for room in the device buffer.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    pub fn device(&self) -> &P {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut P {
        &mut self.device
    }

    fn duration_of(&self, samples: usize) -> Duration {
        samples_to_duration((samples / self.channels) as u64, self.sample_rate)
    }

    fn discard_overflow(&mut self, incoming: usize) {
        let total = self.overflow.len() + incoming;
        let dropped = self.duration_of(total);
        self.overflow.clear();

        let mut state = self.clock.state.write();
        state.dropped += dropped;
        state.overflow_delay = Duration::ZERO;
        state.drop_events += 1;
        warn!(
            samples = total,
            dropped_ms = dropped.as_millis() as u64,
            "Output cannot keep up, dropped buffered audio"
        );
    }
}

impl<P: PlaybackDevice> OutputSink for DeviceSink<P> {
    #[instrument(name = "device_sink_start", skip(self))]
    fn start(&mut self) -> AudioResult<()> {
        self.device.start()?;

        let mut state = self.clock.state.write();
        state.t0 = Instant::now();
        state.buffer_delay = self.device.buffer_delay();
        info!(
            buffer_ms = state.buffer_delay.as_millis() as u64,
            drop_samples = self.drop_samples,
            "Output sink started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.device.stop();
        self.overflow.clear();
        self.clock.state.write().overflow_delay = Duration::ZERO;
    }

    fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn write_samples(&mut self, samples: &[f32]) -> AudioResult<()> {
        if !self.overflow.is_empty() {
            let written = self.device.write(&self.overflow);
            self.overflow.drain(..written);
        }

        if !self.overflow.is_empty() {
            if self.overflow.len() + samples.len() >= self.drop_samples {
                self.discard_overflow(samples.len());
                return Ok(());
            }
            self.overflow.extend_from_slice(samples);
        } else {
            let written = self.device.write(samples);
            self.overflow.extend_from_slice(&samples[written..]);
        }

        let overflow_delay = self.duration_of(self.overflow.len());
        self.clock.state.write().overflow_delay = overflow_delay;
        Ok(())
    }
}
