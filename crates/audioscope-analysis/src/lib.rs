//! Streaming analysis of the captured sample stream.
//!
//! Both analyzers consume mono sample blocks of arbitrary length and emit
//! results on a fixed audio-time cadence, stamped in the capture clock.

mod error;
mod level;
mod spectrum;
mod worker;

pub use error::AnalysisError;
pub use level::{StreamingLevel, PEAK_BACKLOG};
pub use spectrum::{blackman_harris, StreamingSpectrum};
pub use worker::{Analyzer, AnalyzerWorker};

/// Result type for analysis setup.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
