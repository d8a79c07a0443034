//! Audio engine: capture, playback and analysis wired together.
//!
//! The engine owns a capture source, pumps its audio to an output sink on a
//! dedicated thread, and runs a level meter and a spectrum analyzer over the
//! captured stream. Everything it produces is published as shared,
//! timestamped snapshots that consumers pace against the sink clock.

mod error;
mod metrics;
mod orchestrator;
mod output;

pub use error::EngineError;
pub use metrics::MetricsCollector;
pub use orchestrator::Engine;
pub use output::build_sink;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
