//! Error types for the analysis module.

use thiserror::Error;

/// Errors that can occur when setting up analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transform size too small to produce a spectrum.
    #[error("Invalid transform size: {0}")]
    InvalidSize(usize),

    /// Update period of zero.
    #[error("Analysis period must be positive")]
    InvalidPeriod,

    /// The worker thread could not be spawned.
    #[error("Analyzer thread error: {0}")]
    Thread(String),
}
