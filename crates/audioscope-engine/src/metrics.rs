//! Engine statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use audioscope_audio::{DropStats, PumpStatsSnapshot};
use audioscope_types::EngineStats;

/// Accumulates counters across pump runs.
///
/// Each pump keeps its own counters; when it stops they are folded into the
/// totals here so statistics survive a restart.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    blocks_published: AtomicU64,
    frames_captured: AtomicU64,
    underruns: AtomicU64,
    drop_events: AtomicU64,
    dropped_us: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            blocks_published: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            drop_events: AtomicU64::new(0),
            dropped_us: AtomicU64::new(0),
        }
    }

    /// Mark the start of a pump run.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Fold the counters of a finished run into the totals.
    pub fn finish_run(&self, pump: PumpStatsSnapshot, drops: DropStats) {
        self.blocks_published
            .fetch_add(pump.blocks_published, Ordering::Relaxed);
        self.frames_captured
            .fetch_add(pump.frames_captured, Ordering::Relaxed);
        self.underruns.fetch_add(pump.underruns, Ordering::Relaxed);
        self.drop_events.fetch_add(drops.events, Ordering::Relaxed);
        self.dropped_us
            .fetch_add(drops.dropped.as_micros() as u64, Ordering::Relaxed);
        *self.start_time.write() = None;
        debug!(
            blocks = pump.blocks_published,
            underruns = pump.underruns,
            drops = drops.events,
            "Pump run finished"
        );
    }

    /// Totals plus the counters of the running pump, if any.
    pub fn snapshot(&self, live: Option<(PumpStatsSnapshot, DropStats)>) -> EngineStats {
        let (pump, drops) = live.unwrap_or_default();
        let dropped = Duration::from_micros(self.dropped_us.load(Ordering::Relaxed)) + drops.dropped;

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| s.elapsed().as_secs())
            .unwrap_or(0);

        EngineStats {
            blocks_published: self.blocks_published.load(Ordering::Relaxed)
                + pump.blocks_published,
            frames_captured: self.frames_captured.load(Ordering::Relaxed) + pump.frames_captured,
            underruns: self.underruns.load(Ordering::Relaxed) + pump.underruns,
            drop_events: self.drop_events.load(Ordering::Relaxed) + drops.events,
            dropped_ms: dropped.as_millis() as u64,
            uptime_seconds,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_accumulate() {
        let metrics = MetricsCollector::new();
        let run = PumpStatsSnapshot {
            blocks_published: 10,
            frames_captured: 4800,
            underruns: 2,
        };
        let drops = DropStats {
            events: 1,
            dropped: Duration::from_millis(250),
        };

        metrics.start();
        metrics.finish_run(run, drops);
        metrics.start();
        let stats = metrics.snapshot(Some((run, drops)));

        assert_eq!(stats.blocks_published, 20);
        assert_eq!(stats.frames_captured, 9600);
        assert_eq!(stats.underruns, 4);
        assert_eq!(stats.drop_events, 2);
        assert_eq!(stats.dropped_ms, 500);
    }

    #[test]
    fn test_uptime_resets_when_idle() {
        let metrics = MetricsCollector::new();
        metrics.start();
        metrics.finish_run(PumpStatsSnapshot::default(), DropStats::default());
        assert_eq!(metrics.snapshot(None).uptime_seconds, 0);
    }
}
