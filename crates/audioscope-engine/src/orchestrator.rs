//! The audio engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use audioscope_analysis::{AnalyzerWorker, StreamingLevel, StreamingSpectrum};
use audioscope_audio::{
    AudioError, AudioPump, AudioSource, CpalSource, PumpExit, PumpStartError, SharedClock,
};
use audioscope_types::{
    EngineConfig, EngineState, EngineStats, LevelBlock, OutputTarget, Publisher, SampleBlock,
    SourceSelection, SpectrumBlock,
};

use crate::error::EngineError;
use crate::metrics::MetricsCollector;
use crate::output::build_sink;
use crate::EngineResult;

/// Owns the source between runs, the pump while running, and the analyzers
/// for its whole life.
///
/// Captured blocks, levels and spectra are published as shared snapshots;
/// consumers pace themselves against [`Engine::output_time`].
pub struct Engine {
    config: EngineConfig,
    source: Option<Box<dyn AudioSource>>,
    output: OutputTarget,
    pump: Option<AudioPump>,
    clock: Option<SharedClock>,
    state: Arc<RwLock<EngineState>>,
    samples: Arc<Publisher<SampleBlock>>,
    levels: AnalyzerWorker<StreamingLevel>,
    spectra: AnalyzerWorker<StreamingSpectrum>,
    metrics: MetricsCollector,
}

impl Engine {
    /// Create an idle engine and start its analyzer threads.
    #[instrument(name = "engine_new", skip(config))]
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let samples = Arc::new(Publisher::new());
        let levels = AnalyzerWorker::spawn(
            "level-analyzer",
            StreamingLevel::new(config.level_period_ms),
            samples.subscribe(),
            Arc::new(Publisher::new()),
        )?;
        let spectra = AnalyzerWorker::spawn(
            "spectrum-analyzer",
            StreamingSpectrum::new(config.spectrum_size, config.spectrum_period_ms)?,
            samples.subscribe(),
            Arc::new(Publisher::new()),
        )?;

        info!(?config, "Engine created");
        Ok(Self {
            config,
            source: None,
            output: OutputTarget::default(),
            pump: None,
            clock: None,
            state: Arc::new(RwLock::new(EngineState::Idle)),
            samples,
            levels,
            spectra,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Use `source` for the next start.
    pub fn set_source(&mut self, source: Box<dyn AudioSource>) -> EngineResult<()> {
        self.ensure_stopped()?;
        debug!(
            channels = source.channel_count(),
            sample_rate = source.sample_rate(),
            "Source set"
        );
        self.source = Some(source);
        Ok(())
    }

    /// Open a capture device and use it for the next start.
    #[instrument(name = "engine_open_source", skip(self, selection))]
    pub fn open_source(&mut self, selection: &SourceSelection) -> EngineResult<()> {
        self.ensure_stopped()?;
        let poll = Duration::from_millis(u64::from(self.config.source_poll_ms));
        let source = CpalSource::open(selection.clone(), poll)?;
        self.set_source(Box::new(source))
    }

    /// Whether a source is waiting for the next start.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Choose where audio is played on the next start.
    pub fn set_output(&mut self, output: OutputTarget) -> EngineResult<()> {
        self.ensure_stopped()?;
        debug!(?output, "Output set");
        self.output = output;
        Ok(())
    }

    /// Change the device buffer size used on the next start.
    pub fn set_target_output_latency(&mut self, latency_ms: u32) -> EngineResult<()> {
        self.ensure_stopped()?;
        let config = EngineConfig {
            output_latency_ms: latency_ms,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Start moving audio from the source to the output.
    #[instrument(name = "engine_start", skip(self))]
    pub fn start(&mut self) -> EngineResult<()> {
        self.ensure_stopped()?;
        let source = self.source.take().ok_or(EngineError::NoSource)?;
        let channels = source.channel_count();
        let sample_rate = source.sample_rate();

        let sink = match build_sink(&self.output, channels, sample_rate, &self.config) {
            Ok(sink) => sink,
            Err(e) => {
                self.source = Some(source);
                self.transition_to(EngineState::Failed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        let clock = sink.clock();

        match AudioPump::start(source, sink, Arc::clone(&self.samples)) {
            Ok(pump) => {
                self.pump = Some(pump);
                self.clock = Some(clock);
                self.metrics.start();
                self.transition_to(EngineState::Running {
                    channels,
                    sample_rate,
                });
                info!(channels, sample_rate, "Engine started");
                Ok(())
            }
            Err(PumpStartError { error, source }) => {
                error!("Engine start failed: {}", error);
                self.source = source;
                self.transition_to(EngineState::Failed {
                    message: error.to_string(),
                });
                Err(error.into())
            }
        }
    }

    /// Stop the pump, keeping the source for the next start.
    ///
    /// Returns the error that ended the pump, if it died on its own.
    #[instrument(name = "engine_stop", skip(self))]
    pub fn stop(&mut self) -> EngineResult<()> {
        let exit = self.take_pump()?;
        let result = self.finish(exit);
        info!("Engine stopped");
        result
    }

    /// Current position of the audible output in the capture clock.
    pub fn output_time(&self) -> Instant {
        self.clock
            .as_ref()
            .map(|clock| clock.time())
            .unwrap_or_else(Instant::now)
    }

    /// Captured sample blocks, from now on.
    pub fn subscribe_samples(&self) -> Receiver<Arc<SampleBlock>> {
        self.samples.subscribe()
    }

    /// Level blocks, from now on.
    pub fn subscribe_levels(&self) -> Receiver<Arc<LevelBlock>> {
        self.levels.subscribe()
    }

    /// Spectrum blocks, from now on.
    pub fn subscribe_spectra(&self) -> Receiver<Arc<SpectrumBlock>> {
        self.spectra.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.pump.is_some()
    }

    /// Notice a pump that ended on its own and return the resulting state.
    pub fn refresh(&mut self) -> EngineState {
        if self.pump.as_ref().is_some_and(|p| p.is_finished()) {
            warn!("Audio pump ended unexpectedly");
            if let Ok(exit) = self.take_pump() {
                let _ = self.finish(exit);
            }
        }
        self.state()
    }

    /// Counters of all runs so far, including the current one.
    pub fn stats(&self) -> EngineStats {
        let live = self.pump.as_ref().map(|pump| {
            let drops = self
                .clock
                .as_ref()
                .map(|clock| clock.drops())
                .unwrap_or_default();
            (pump.stats(), drops)
        });
        self.metrics.snapshot(live)
    }

    fn ensure_stopped(&self) -> EngineResult<()> {
        if self.pump.is_some() {
            Err(EngineError::AlreadyRunning)
        } else {
            Ok(())
        }
    }

    /// Stop the pump and fold its counters into the totals.
    fn take_pump(&mut self) -> EngineResult<Option<PumpExit>> {
        let mut pump = self.pump.take().ok_or(EngineError::NotRunning)?;
        let drops = self
            .clock
            .take()
            .map(|clock| clock.drops())
            .unwrap_or_default();
        let exit = pump.stop();
        self.metrics.finish_run(pump.stats(), drops);
        Ok(exit)
    }

    /// Take back the source and settle the state after a pump exit.
    fn finish(&mut self, exit: Option<PumpExit>) -> EngineResult<()> {
        let Some(PumpExit { source, result }) = exit else {
            let message = "audio pump thread panicked".to_string();
            self.transition_to(EngineState::Failed {
                message: message.clone(),
            });
            return Err(AudioError::Thread(message).into());
        };

        self.source = Some(source);
        match result {
            Ok(()) => {
                self.transition_to(EngineState::Idle);
                Ok(())
            }
            Err(e) => {
                error!("Audio pump failed: {}", e);
                self.transition_to(EngineState::Failed {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn transition_to(&self, new_state: EngineState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, new_state)
        };

        debug!(
            previous = %previous.name(),
            current = %self.state.read().name(),
            "State transition"
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.pump.is_some() {
            let _ = self.stop();
        }
    }
}
