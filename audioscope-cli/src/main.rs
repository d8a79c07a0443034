//! Live audio level and spectrum monitor.
//!
//! Captures from an input device, optionally plays it back, and prints the
//! level and dominant frequency in step with what is audible.

mod args;
mod config;

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use audioscope_audio::{enumerate_audio_devices, DeviceDirection};
use audioscope_engine::Engine;
use audioscope_types::{LevelBlock, SpectrumBlock, TimedQueue, TIMED_QUEUE_CAPACITY};

use crate::args::CliArgs;
use crate::config::AppConfig;

/// Interval between display updates.
const RENDER_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = CliArgs::parse();
    if args.show_help {
        CliArgs::print_help();
        return Ok(());
    }

    if args.list_devices {
        return list_devices();
    }

    let mut config = match &args.config_path {
        Some(path) => AppConfig::load(Path::new(path))?,
        None => AppConfig::default(),
    };
    config.apply_args(&args);

    run(&config, args.seconds.map(Duration::from_secs))
}

fn list_devices() -> Result<()> {
    let devices = enumerate_audio_devices().context("Failed to enumerate audio devices")?;
    for direction in [DeviceDirection::Input, DeviceDirection::Output] {
        println!("{:?} devices:", direction);
        for device in devices.iter().filter(|d| d.direction == direction) {
            let marker = if device.is_default { "*" } else { " " };
            println!("  {} {}", marker, device.name);
        }
    }
    Ok(())
}

fn run(config: &AppConfig, duration: Option<Duration>) -> Result<()> {
    let mut engine = Engine::new(config.engine.clone()).context("Failed to create engine")?;
    engine.set_output(config.output.clone())?;
    engine
        .open_source(&config.source)
        .context("Failed to open capture device")?;

    let levels = engine.subscribe_levels();
    let spectra = engine.subscribe_spectra();
    let mut level_queue: TimedQueue<Arc<LevelBlock>> = TimedQueue::new(TIMED_QUEUE_CAPACITY);
    let mut spectrum_queue: TimedQueue<Arc<SpectrumBlock>> = TimedQueue::new(TIMED_QUEUE_CAPACITY);
    let mut due_levels = Vec::new();
    let mut due_spectra = Vec::new();

    engine.start().context("Failed to start engine")?;
    info!(output = ?config.output, "Monitoring, press Ctrl+C to quit");

    let started = Instant::now();
    while duration.map_or(true, |d| started.elapsed() < d) {
        thread::sleep(RENDER_INTERVAL);

        let state = engine.refresh();
        if state.is_failed() {
            bail!("Engine stopped: {:?}", state);
        }

        levels.try_iter().for_each(|l| level_queue.push(l));
        spectra.try_iter().for_each(|s| spectrum_queue.push(s));

        let now = engine.output_time();
        level_queue.fetch_up_to(now, &mut due_levels);
        spectrum_queue.fetch_up_to(now, &mut due_spectra);

        if let Some(level) = due_levels.last() {
            let peak_hz = due_spectra.last().and_then(|s| dominant_frequency(s));
            println!("{}", render_line(level, peak_hz));
        }
        due_levels.clear();
        due_spectra.clear();
    }

    if let Err(e) = engine.stop() {
        warn!("Engine stopped with error: {}", e);
    }
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    Ok(())
}

/// Frequency of the strongest bin above DC.
fn dominant_frequency(spectrum: &SpectrumBlock) -> Option<f32> {
    spectrum
        .magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .filter(|(_, m)| **m > 1e-6)
        .map(|(i, _)| spectrum.bin_frequency(i))
}

fn render_line(level: &LevelBlock, peak_hz: Option<f32>) -> String {
    const WIDTH: usize = 40;
    let filled = ((level.curr.clamp(0.0, 1.0) * WIDTH as f32) as usize).min(WIDTH);
    let peak = ((level.recent_peak.clamp(0.0, 1.0) * WIDTH as f32) as usize).min(WIDTH - 1);

    let mut bar: Vec<char> = std::iter::repeat('#')
        .take(filled)
        .chain(std::iter::repeat(' ').take(WIDTH - filled))
        .collect();
    if peak >= filled {
        bar[peak] = '|';
    }

    let freq = peak_hz
        .map(|hz| format!("{:>8.1} Hz", hz))
        .unwrap_or_else(|| "       - Hz".to_string());
    format!(
        "[{}] rms {:.3} peak {:.3} {}",
        bar.into_iter().collect::<String>(),
        level.curr,
        level.recent_peak,
        freq
    )
}
