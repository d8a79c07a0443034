//! Output sink construction.

use std::time::Duration;

use tracing::debug;

use audioscope_audio::{CpalPlayback, DeviceSink, NullSink, OutputSink};
use audioscope_types::{EngineConfig, OutputTarget};

use crate::EngineResult;

/// Build the sink for `target`, laid out like the source feeding it.
pub fn build_sink(
    target: &OutputTarget,
    channels: u16,
    sample_rate: u32,
    config: &EngineConfig,
) -> EngineResult<Box<dyn OutputSink>> {
    match target {
        OutputTarget::Null => {
            debug!("Using null output");
            let latency = Duration::from_millis(u64::from(config.null_sink_latency_ms));
            Ok(Box::new(NullSink::new(latency)))
        }
        OutputTarget::Device { name } => {
            let latency = Duration::from_millis(u64::from(config.output_latency_ms));
            let drop_threshold = Duration::from_millis(u64::from(config.drop_threshold_ms));
            let playback = CpalPlayback::open(name.clone(), channels, sample_rate, latency)?;
            Ok(Box::new(DeviceSink::new(playback, drop_threshold)))
        }
    }
}
