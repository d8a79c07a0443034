//! The capture pump.
//!
//! One thread owns a source and a sink. Every block read from the source is
//! downmixed, stamped with its capture time, published to subscribers and
//! then forwarded unchanged to the sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, info, instrument, trace, warn};

use audioscope_types::{Publisher, SampleBlock};

use crate::error::AudioError;
use crate::sink::OutputSink;
use crate::source::AudioSource;
use crate::AudioResult;

/// Back-off after a read that returned no data.
const UNDERRUN_BACKOFF: Duration = Duration::from_millis(10);

/// Sum interleaved channels into one sample per frame.
///
/// Trailing samples that do not form a whole frame are ignored.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum())
        .collect()
}

/// Counters maintained by the pump thread.
#[derive(Debug, Default)]
pub struct PumpStats {
    blocks_published: AtomicU64,
    frames_captured: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`PumpStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStatsSnapshot {
    pub blocks_published: u64,
    pub frames_captured: u64,
    pub underruns: u64,
}

impl PumpStats {
    pub fn snapshot(&self) -> PumpStatsSnapshot {
        PumpStatsSnapshot {
            blocks_published: self.blocks_published.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// What the pump thread leaves behind.
pub struct PumpExit {
    /// The source, stopped, ready to be started again.
    pub source: Box<dyn AudioSource>,

    /// `Err` if the loop ended because a read or write failed.
    pub result: AudioResult<()>,
}

/// Failure to bring the pump up.
pub struct PumpStartError {
    pub error: AudioError,

    /// The source, unless the pump thread could not be spawned or panicked.
    pub source: Option<Box<dyn AudioSource>>,
}

impl std::fmt::Debug for PumpStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpStartError")
            .field("error", &self.error)
            .field("source_returned", &self.source.is_some())
            .finish()
    }
}

/// A running capture pump.
pub struct AudioPump {
    pump_thread: Option<JoinHandle<PumpExit>>,
    should_stop: Arc<AtomicBool>,
    stats: Arc<PumpStats>,
}

impl AudioPump {
    /// Start `source` and `sink` on a new pump thread.
    ///
    /// Blocks until both are started. On failure the source is handed back
    /// in the error.
    #[instrument(name = "pump_start", skip_all)]
    pub fn start(
        source: Box<dyn AudioSource>,
        sink: Box<dyn OutputSink>,
        publisher: Arc<Publisher<SampleBlock>>,
    ) -> Result<Self, PumpStartError> {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PumpStats::default());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread_stop = Arc::clone(&should_stop);
        let thread_stats = Arc::clone(&stats);

        // The source moves into the closure, so a spawn failure loses it.
        let handle = thread::Builder::new()
            .name("audio-pump".to_string())
            .spawn(move || pump_thread(source, sink, publisher, thread_stop, thread_stats, ready_tx))
            .map_err(|e| PumpStartError {
                error: AudioError::Thread(e.to_string()),
                source: None,
            })?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::Thread("pump thread exited".to_string())));

        if let Err(error) = ready {
            let source = handle.join().ok().map(|exit| exit.source);
            return Err(PumpStartError { error, source });
        }

        info!("Audio pump started");
        Ok(Self {
            pump_thread: Some(handle),
            should_stop,
            stats,
        })
    }

    /// Stop the pump and take back the source.
    ///
    /// Returns `None` if the pump was already stopped.
    #[instrument(name = "pump_stop", skip(self))]
    pub fn stop(&mut self) -> Option<PumpExit> {
        let handle = self.pump_thread.take()?;
        self.should_stop.store(true, Ordering::SeqCst);

        match handle.join() {
            Ok(exit) => {
                info!(ok = exit.result.is_ok(), "Audio pump stopped");
                Some(exit)
            }
            Err(_) => {
                warn!("Audio pump thread panicked");
                None
            }
        }
    }

    /// Whether the pump thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.pump_thread
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    pub fn stats(&self) -> PumpStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for AudioPump {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn pump_thread(
    mut source: Box<dyn AudioSource>,
    mut sink: Box<dyn OutputSink>,
    publisher: Arc<Publisher<SampleBlock>>,
    should_stop: Arc<AtomicBool>,
    stats: Arc<PumpStats>,
    ready_tx: Sender<AudioResult<()>>,
) -> PumpExit {
    if let Err(e) = source.start() {
        let _ = ready_tx.send(Err(e));
        return PumpExit {
            source,
            result: Ok(()),
        };
    }
    if let Err(e) = sink.start() {
        source.stop();
        let _ = ready_tx.send(Err(e));
        return PumpExit {
            source,
            result: Ok(()),
        };
    }
    let _ = ready_tx.send(Ok(()));
    debug!("Pump thread running");

    let mut interleaved = Vec::new();
    let mut first_block = true;
    let result = loop {
        if should_stop.load(Ordering::SeqCst) {
            break Ok(());
        }

        let t = match source.read_samples(&mut interleaved) {
            Ok(t) => t,
            Err(e) => {
                warn!("Audio read failed: {}", e);
                break Err(e);
            }
        };

        if interleaved.is_empty() {
            stats.underruns.fetch_add(1, Ordering::Relaxed);
            trace!("No audio data this period");
            thread::sleep(UNDERRUN_BACKOFF);
            continue;
        }

        let channels = source.channel_count();
        let block = SampleBlock {
            t,
            sample_rate: source.sample_rate(),
            channels,
            mono_samples: downmix_to_mono(&interleaved, channels),
            original_samples: std::mem::take(&mut interleaved),
            discontinuity: std::mem::replace(&mut first_block, false),
        };
        let frames = block.frames() as u64;
        let block = publisher.publish(block);

        stats.blocks_published.fetch_add(1, Ordering::Relaxed);
        stats.frames_captured.fetch_add(frames, Ordering::Relaxed);
        trace!(frames, "Published sample block");

        if let Err(e) = sink.write_samples(&block.original_samples) {
            warn!("Audio output failed: {}", e);
            break Err(e);
        }
    };

    source.stop();
    sink.stop();
    drop(sink);
    debug!("Pump thread exiting");

    PumpExit { source, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{NullSink, SharedClock};
    use parking_lot::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct SourceLog {
        starts: usize,
        stops: usize,
    }

    /// Source that yields `blocks` blocks of a constant value, then either
    /// underruns forever or fails.
    struct FakeSource {
        channels: u16,
        block: Vec<f32>,
        remaining: usize,
        fail_when_done: bool,
        fail_start: bool,
        log: Arc<Mutex<SourceLog>>,
    }

    impl FakeSource {
        fn new(channels: u16, block: Vec<f32>, blocks: usize) -> Self {
            Self {
                channels,
                block,
                remaining: blocks,
                fail_when_done: false,
                fail_start: false,
                log: Arc::new(Mutex::new(SourceLog::default())),
            }
        }
    }

    impl AudioSource for FakeSource {
        fn channel_count(&self) -> u16 {
            self.channels
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }

        fn start(&mut self) -> AudioResult<()> {
            if self.fail_start {
                return Err(AudioError::DeviceNotFound("fake".to_string()));
            }
            self.log.lock().starts += 1;
            Ok(())
        }

        fn read_samples(&mut self, dest: &mut Vec<f32>) -> AudioResult<Instant> {
            dest.clear();
            if self.remaining > 0 {
                self.remaining -= 1;
                dest.extend_from_slice(&self.block);
            } else if self.fail_when_done {
                return Err(AudioError::DeviceLost);
            } else {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(Instant::now())
        }

        fn stop(&mut self) {
            self.log.lock().stops += 1;
        }
    }

    /// Sink recording every write.
    struct RecordingSink {
        written: Arc<Mutex<Vec<f32>>>,
        fail_start: bool,
    }

    impl OutputSink for RecordingSink {
        fn start(&mut self) -> AudioResult<()> {
            if self.fail_start {
                Err(AudioError::FormatNotSupported("fake".to_string()))
            } else {
                Ok(())
            }
        }

        fn stop(&mut self) {}

        fn clock(&self) -> SharedClock {
            NullSink::new(Duration::ZERO).clock()
        }

        fn write_samples(&mut self, samples: &[f32]) -> AudioResult<()> {
            self.written.lock().extend_from_slice(samples);
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_downmix_sums_channels() {
        let mono = downmix_to_mono(&[0.25, 0.5, -1.0, 0.5, 0.1], 2);
        assert_eq!(mono, vec![0.75, -0.5]);
        assert_eq!(downmix_to_mono(&[0.3, 0.4], 1), vec![0.3, 0.4]);
    }

    #[test]
    fn test_blocks_are_published_and_forwarded() {
        let publisher = Arc::new(Publisher::new());
        let blocks = publisher.subscribe();
        let written = Arc::new(Mutex::new(Vec::new()));
        let source = FakeSource::new(2, vec![0.5, 0.25, 0.5, 0.25], 3);
        let sink = RecordingSink {
            written: Arc::clone(&written),
            fail_start: false,
        };

        let mut pump =
            AudioPump::start(Box::new(source), Box::new(sink), Arc::clone(&publisher)).unwrap();
        wait_until(|| pump.stats().blocks_published == 3);

        for i in 0..3 {
            let block = blocks.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(block.discontinuity, i == 0);
            assert_eq!(block.channels, 2);
            assert_eq!(block.sample_rate, 48_000);
            assert_eq!(block.mono_samples, vec![0.75, 0.75]);
            assert_eq!(block.original_samples, vec![0.5, 0.25, 0.5, 0.25]);
        }

        let exit = pump.stop().unwrap();
        assert!(exit.result.is_ok());
        assert_eq!(written.lock().len(), 12);
        assert_eq!(pump.stats().frames_captured, 6);
        assert!(pump.stop().is_none());
    }

    #[test]
    fn test_empty_reads_count_as_underruns() {
        let publisher = Arc::new(Publisher::new());
        let source = FakeSource::new(1, vec![0.0; 4], 0);
        let sink = NullSink::new(Duration::ZERO);

        let mut pump = AudioPump::start(Box::new(source), Box::new(sink), publisher).unwrap();
        wait_until(|| pump.stats().underruns >= 2);
        assert_eq!(pump.stats().blocks_published, 0);
        assert!(pump.stop().is_some());
    }

    #[test]
    fn test_read_failure_ends_loop_and_returns_source() {
        let publisher = Arc::new(Publisher::new());
        let mut source = FakeSource::new(1, vec![0.1; 4], 1);
        source.fail_when_done = true;
        let log = Arc::clone(&source.log);

        let mut pump = AudioPump::start(
            Box::new(source),
            Box::new(NullSink::new(Duration::ZERO)),
            publisher,
        )
        .unwrap();
        wait_until(|| pump.is_finished());

        let exit = pump.stop().unwrap();
        assert!(matches!(exit.result, Err(AudioError::DeviceLost)));
        assert_eq!(exit.source.channel_count(), 1);
        assert_eq!(log.lock().stops, 1);
    }

    #[test]
    fn test_source_start_failure_returns_source() {
        let mut source = FakeSource::new(1, Vec::new(), 0);
        source.fail_start = true;

        let err = AudioPump::start(
            Box::new(source),
            Box::new(NullSink::new(Duration::ZERO)),
            Arc::new(Publisher::new()),
        )
        .err()
        .unwrap();

        assert!(matches!(err.error, AudioError::DeviceNotFound(_)));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_sink_start_failure_stops_source() {
        let source = FakeSource::new(1, Vec::new(), 0);
        let log = Arc::clone(&source.log);
        let sink = RecordingSink {
            written: Arc::new(Mutex::new(Vec::new())),
            fail_start: true,
        };

        let err = AudioPump::start(Box::new(source), Box::new(sink), Arc::new(Publisher::new()))
            .err()
            .unwrap();

        assert!(matches!(err.error, AudioError::FormatNotSupported(_)));
        assert!(err.source.is_some());
        let log = log.lock();
        assert_eq!((log.starts, log.stops), (1, 1));
    }

    #[test]
    fn test_source_can_be_restarted_after_stop() {
        let publisher = Arc::new(Publisher::new());
        let source = FakeSource::new(1, vec![0.2; 8], 100);
        let log = Arc::clone(&source.log);

        let mut pump = AudioPump::start(
            Box::new(source),
            Box::new(NullSink::new(Duration::ZERO)),
            Arc::clone(&publisher),
        )
        .unwrap();
        let exit = pump.stop().unwrap();

        let mut pump = AudioPump::start(
            exit.source,
            Box::new(NullSink::new(Duration::ZERO)),
            publisher,
        )
        .unwrap();
        assert!(pump.stop().is_some());
        let log = log.lock();
        assert_eq!((log.starts, log.stops), (2, 2));
    }

    #[test]
    fn test_each_run_opens_with_a_discontinuity() {
        let publisher = Arc::new(Publisher::new());
        let blocks = publisher.subscribe();

        for _ in 0..2 {
            let source = FakeSource::new(1, vec![0.2; 8], 3);
            let mut pump = AudioPump::start(
                Box::new(source),
                Box::new(NullSink::new(Duration::ZERO)),
                Arc::clone(&publisher),
            )
            .unwrap();
            wait_until(|| pump.stats().blocks_published == 3);
            pump.stop().unwrap();

            let run: Vec<_> = blocks.try_iter().map(|b| b.discontinuity).collect();
            assert_eq!(run, vec![true, false, false]);
        }
    }
}
