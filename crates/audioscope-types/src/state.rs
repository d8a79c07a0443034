//! Engine state machine and statistics types.

use serde::{Deserialize, Serialize};

/// The current state of the audio engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum EngineState {
    /// No pump is running.
    #[default]
    Idle,

    /// The pump is moving audio from source to sink.
    Running {
        /// Channel count of the running source.
        channels: u16,

        /// Sample rate of the running source.
        sample_rate: u32,
    },

    /// The pump stopped on its own because of an error.
    Failed {
        /// Error message.
        message: String,
    },
}

impl EngineState {
    /// Returns true if the engine is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the pump is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Returns true if the pump died with an error.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running { .. } => "Running",
            Self::Failed { .. } => "Failed",
        }
    }
}

/// Snapshot of pump and sink counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Sample blocks published since the pump started.
    pub blocks_published: u64,

    /// Frames captured since the pump started.
    pub frames_captured: u64,

    /// Reads that returned no data.
    pub underruns: u64,

    /// Times the output sink discarded its overflow.
    pub drop_events: u64,

    /// Total audio discarded by the output sink, in milliseconds.
    pub dropped_ms: u64,

    /// Seconds since the pump started.
    pub uptime_seconds: u64,
}
