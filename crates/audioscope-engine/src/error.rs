//! Error types for the engine.

use thiserror::Error;

use audioscope_analysis::AnalysisError;
use audioscope_audio::AudioError;
use audioscope_types::ConfigError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// `start` while the pump is running, or reconfiguring a running engine.
    #[error("Engine is already running")]
    AlreadyRunning,

    /// `stop` while no pump is running.
    #[error("Engine is not running")]
    NotRunning,

    /// `start` before a source was set.
    #[error("No audio source configured")]
    NoSource,
}
