//! Playback through a cpal output device.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use audioscope_types::samples_to_duration;

use crate::device::{check_output_format, find_output_device, stream_config};
use crate::error::AudioError;
use crate::sink::{PlaybackDevice, PlaybackPosition};
use crate::AudioResult;

/// Samples waiting to be played, bounded by the requested latency.
type PlaybackBuffer = Arc<Mutex<VecDeque<f32>>>;

struct RunningPlayback {
    stop_tx: Sender<()>,
    stream_thread: JoinHandle<()>,
}

/// Output device fed from a bounded sample buffer.
///
/// The buffer holds `latency` worth of interleaved samples; writes beyond
/// that are refused and left to the caller. The device callback drains it
/// and fills any shortfall with silence.
pub struct CpalPlayback {
    device_name: Option<String>,
    channels: u16,
    sample_rate: u32,
    capacity: usize,
    buffer: PlaybackBuffer,
    position: Arc<PlaybackPosition>,
    running: Option<RunningPlayback>,
}

impl CpalPlayback {
    /// Open a playback device for `f32` output in the given layout.
    #[instrument(name = "cpal_playback_open", skip(device_name), fields(device = ?device_name))]
    pub fn open(
        device_name: Option<String>,
        channels: u16,
        sample_rate: u32,
        latency: Duration,
    ) -> AudioResult<Self> {
        let device = find_output_device(device_name.as_deref())?;
        check_output_format(&device, channels, sample_rate)?;

        let frames = (latency.as_micros() * u128::from(sample_rate) / 1_000_000) as usize;
        let capacity = frames.max(1) * usize::from(channels.max(1));

        info!(
            channels,
            sample_rate,
            latency_ms = latency.as_millis() as u64,
            "Opened playback device"
        );

        Ok(Self {
            device_name,
            channels,
            sample_rate,
            capacity,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            position: Arc::new(PlaybackPosition::new(sample_rate)),
            running: None,
        })
    }
}

impl PlaybackDevice for CpalPlayback {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    #[instrument(name = "cpal_playback_start", skip(self))]
    fn start(&mut self) -> AudioResult<()> {
        if self.running.is_some() {
            return Err(AudioError::AlreadyStarted);
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let ctx = StreamContext {
            device_name: self.device_name.clone(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            buffer: Arc::clone(&self.buffer),
            position: Arc::clone(&self.position),
        };

        let stream_thread = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || stream_thread(ctx, ready_tx, stop_rx))
            .map_err(|e| AudioError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err(AudioError::Thread("playback thread exited".to_string()));
            }
        }

        self.running = Some(RunningPlayback {
            stop_tx,
            stream_thread,
        });
        info!("Audio playback started");
        Ok(())
    }

    #[instrument(name = "cpal_playback_stop", skip(self))]
    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(());
        let _ = running.stream_thread.join();
        self.buffer.lock().clear();
        info!(frames = self.position.frames(), "Audio playback stopped");
    }

    fn write(&mut self, samples: &[f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let room = self.capacity.saturating_sub(buffer.len());
        let accepted = samples.len().min(room);
        buffer.extend(&samples[..accepted]);
        accepted
    }

    fn buffer_delay(&self) -> Duration {
        let frames = self.capacity / usize::from(self.channels.max(1));
        samples_to_duration(frames as u64, self.sample_rate)
    }

    fn position(&self) -> Arc<PlaybackPosition> {
        Arc::clone(&self.position)
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StreamContext {
    device_name: Option<String>,
    channels: u16,
    sample_rate: u32,
    buffer: PlaybackBuffer,
    position: Arc<PlaybackPosition>,
}

fn stream_thread(ctx: StreamContext, ready_tx: Sender<AudioResult<()>>, stop_rx: Receiver<()>) {
    match open_stream(ctx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Playback stream closed");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(ctx: StreamContext) -> AudioResult<cpal::Stream> {
    let device = find_output_device(ctx.device_name.as_deref())?;
    let config = stream_config(ctx.channels, ctx.sample_rate);
    let channels = usize::from(ctx.channels.max(1));
    let buffer = ctx.buffer;
    let position = ctx.position;

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let played = fill_output(&buffer, data);
            position.advance((played / channels) as u64);
        },
        |err| warn!("Audio output stream error: {}", err),
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

/// Copy queued samples into `out`, padding with silence.
///
/// Returns how many queued samples were played.
fn fill_output(buffer: &Mutex<VecDeque<f32>>, out: &mut [f32]) -> usize {
    let mut buffer = buffer.lock();
    let available = buffer.len().min(out.len());
    for (slot, sample) in out.iter_mut().zip(buffer.drain(..available)) {
        *slot = sample;
    }
    out[available..].fill(0.0);
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_output_pads_with_silence() {
        let buffer = Mutex::new(VecDeque::from(vec![0.5, -0.5, 0.25]));
        let mut out = [1.0f32; 5];

        let played = fill_output(&buffer, &mut out);

        assert_eq!(played, 3);
        assert_eq!(out, [0.5, -0.5, 0.25, 0.0, 0.0]);
        assert!(buffer.lock().is_empty());
    }

    #[test]
    fn test_fill_output_leaves_remainder_queued() {
        let buffer = Mutex::new(VecDeque::from(vec![0.1, 0.2, 0.3, 0.4]));
        let mut out = [0.0f32; 2];

        assert_eq!(fill_output(&buffer, &mut out), 2);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(buffer.lock().len(), 2);
    }
}
