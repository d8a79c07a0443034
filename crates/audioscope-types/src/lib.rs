//! Shared data model for audioscope.
//!
//! This crate defines the timestamped blocks handed from the capture pump to
//! the analyzers and to external consumers, the engine configuration, and the
//! two pieces of handoff infrastructure every consumer uses: the fan-out
//! [`Publisher`] and the clock-paced [`TimedQueue`].

mod blocks;
mod config;
mod publish;
mod queue;
mod state;

pub use blocks::{samples_to_duration, LevelBlock, SampleBlock, SpectrumBlock, Timestamped};
pub use config::{ConfigError, EngineConfig, OutputTarget, SampleEncoding, SourceSelection};
pub use publish::Publisher;
pub use queue::TimedQueue;
pub use state::{EngineState, EngineStats};

/// Default capacity for consumer-side timed queues.
pub const TIMED_QUEUE_CAPACITY: usize = 64;
