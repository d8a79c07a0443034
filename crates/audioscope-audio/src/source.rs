//! Audio sources.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, instrument, warn};

use audioscope_types::{samples_to_duration, SourceSelection};

use crate::convert::{cpal_format, make_converter, SampleConverter};
use crate::device::{check_input_format, find_input_device, stream_config};
use crate::error::AudioError;
use crate::AudioResult;

/// A stream of captured audio.
///
/// Sources are moved onto the pump thread while running and handed back
/// when the pump stops, so they must be `Send`.
pub trait AudioSource: Send {
    /// Number of interleaved channels returned by `read_samples`.
    fn channel_count(&self) -> u16;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Open the device and begin capturing.
    fn start(&mut self) -> AudioResult<()>;

    /// Block until the next period of data is available.
    ///
    /// Replaces `dest` with interleaved samples in [-1, 1] and returns the
    /// capture time of the first frame. An empty `dest` means no data arrived.
    fn read_samples(&mut self, dest: &mut Vec<f32>) -> AudioResult<Instant>;

    /// Release the device. Safe to call when already stopped.
    fn stop(&mut self);
}

/// Something delivered by the capture callback.
enum CaptureEvent {
    /// One callback's worth of raw samples.
    Data { bytes: Bytes, delay: Duration },

    /// The backend reported a stream error.
    Error(String),
}

/// Capture time of the next frame: stream start plus the audio read so far,
/// less the device's input delay. Never earlier than the stream start.
fn capture_time(t0: Instant, frames_read: u64, sample_rate: u32, delay: Duration) -> Instant {
    t0 + samples_to_duration(frames_read, sample_rate).saturating_sub(delay)
}

/// Handles held while a capture stream is open.
struct RunningStream {
    events: Receiver<CaptureEvent>,
    stop_tx: Sender<()>,
    stream_thread: JoinHandle<()>,
    t0: Instant,
    frames_read: u64,
}

/// Capture source backed by a cpal input device.
///
/// cpal streams cannot move between threads, so the stream is built and
/// owned by a small holder thread; captured buffers reach the reader over a
/// channel. This keeps the source itself `Send`.
pub struct CpalSource {
    selection: SourceSelection,
    converter: Box<dyn SampleConverter>,
    poll_interval: Duration,
    running: Option<RunningStream>,
}

impl CpalSource {
    /// Open a capture device in the selected format.
    ///
    /// Fails if no converter exists for the encoding or the device does not
    /// support the requested layout.
    #[instrument(name = "cpal_source_open", skip(selection), fields(device = ?selection.device))]
    pub fn open(selection: SourceSelection, poll_interval: Duration) -> AudioResult<Self> {
        let converter = make_converter(selection.encoding, selection.bits)?;
        let device = find_input_device(selection.device.as_deref())?;
        check_input_format(
            &device,
            selection.channels,
            selection.sample_rate,
            selection.encoding,
            selection.bits,
        )?;

        info!(
            channels = selection.channels,
            sample_rate = selection.sample_rate,
            encoding = ?selection.encoding,
            bits = selection.bits,
            "Opened capture device"
        );

        Ok(Self {
            selection,
            converter,
            poll_interval,
            running: None,
        })
    }

    /// The selection this source was opened with.
    pub fn selection(&self) -> &SourceSelection {
        &self.selection
    }
}

impl AudioSource for CpalSource {
    fn channel_count(&self) -> u16 {
        self.selection.channels
    }

    fn sample_rate(&self) -> u32 {
        self.selection.sample_rate
    }

    #[instrument(name = "cpal_source_start", skip(self))]
    fn start(&mut self) -> AudioResult<()> {
        if self.running.is_some() {
            return Err(AudioError::AlreadyStarted);
        }

        let (event_tx, events) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let selection = self.selection.clone();

        let stream_thread = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || stream_thread(selection, event_tx, ready_tx, stop_rx))
            .map_err(|e| AudioError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err(AudioError::Thread("capture thread exited".to_string()));
            }
        }

        self.running = Some(RunningStream {
            events,
            stop_tx,
            stream_thread,
            t0: Instant::now(),
            frames_read: 0,
        });

        info!("Audio capture started");
        Ok(())
    }

    fn read_samples(&mut self, dest: &mut Vec<f32>) -> AudioResult<Instant> {
        let channels = usize::from(self.selection.channels.max(1));
        let sample_rate = self.selection.sample_rate;
        let gain = self.selection.gain;
        let running = self.running.as_mut().ok_or(AudioError::NotStarted)?;

        match running.events.recv_timeout(self.poll_interval) {
            Ok(CaptureEvent::Data { bytes, delay }) => {
                self.converter.convert(&bytes, dest);
                if gain != 1.0 {
                    dest.iter_mut().for_each(|s| *s *= gain);
                }

                let t = capture_time(running.t0, running.frames_read, sample_rate, delay);
                running.frames_read += (dest.len() / channels) as u64;
                Ok(t)
            }
            Ok(CaptureEvent::Error(message)) => Err(AudioError::Stream(message)),
            Err(RecvTimeoutError::Timeout) => {
                dest.clear();
                Ok(Instant::now())
            }
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::DeviceLost),
        }
    }

    #[instrument(name = "cpal_source_stop", skip(self))]
    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(());
        let _ = running.stream_thread.join();
        info!(frames = running.frames_read, "Audio capture stopped");
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stream_thread(
    selection: SourceSelection,
    event_tx: Sender<CaptureEvent>,
    ready_tx: Sender<AudioResult<()>>,
    stop_rx: Receiver<()>,
) {
    match open_stream(&selection, event_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            // Either a stop request or the source being dropped ends the wait.
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Capture stream closed");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(
    selection: &SourceSelection,
    event_tx: Sender<CaptureEvent>,
) -> AudioResult<cpal::Stream> {
    let device = find_input_device(selection.device.as_deref())?;
    let format = cpal_format(selection.encoding, selection.bits)?;
    let config = stream_config(selection.channels, selection.sample_rate);
    let error_tx = event_tx.clone();

    let stream = device.build_input_stream_raw(
        &config,
        format,
        move |data: &cpal::Data, info: &cpal::InputCallbackInfo| {
            let timestamp = info.timestamp();
            let delay = timestamp
                .callback
                .duration_since(&timestamp.capture)
                .unwrap_or_default();
            let _ = event_tx.send(CaptureEvent::Data {
                bytes: Bytes::copy_from_slice(data.bytes()),
                delay,
            });
        },
        move |err| {
            warn!("Audio input stream error: {}", err);
            let _ = error_tx.send(CaptureEvent::Error(err.to_string()));
        },
        None,
    )?;

    stream.play()?;
    Ok(stream)
}
