//! Error types for the audio module.

use thiserror::Error;

use audioscope_types::SampleEncoding;

/// Errors that can occur during audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No converter exists for this encoding and width.
    #[error("Unsupported sample format: {encoding:?} {bits}-bit")]
    UnsupportedFormat { encoding: SampleEncoding, bits: u16 },

    /// The device cannot be opened in the requested format.
    #[error("Audio format not supported: {0}")]
    FormatNotSupported(String),

    /// Audio device not found.
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Device enumeration or query failed.
    #[error("Audio host error: {0}")]
    Host(String),

    /// Building, starting or running a stream failed.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// The device stopped delivering data.
    #[error("Audio device lost")]
    DeviceLost,

    /// Source or sink already started.
    #[error("Audio stream already started")]
    AlreadyStarted,

    /// Source or sink not started.
    #[error("Audio stream not started")]
    NotStarted,

    /// A worker thread could not be spawned or died.
    #[error("Audio thread error: {0}")]
    Thread(String),
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::StreamConfigNotSupported => {
                Self::FormatNotSupported(err.to_string())
            }
            cpal::BuildStreamError::DeviceNotAvailable => Self::DeviceLost,
            other => Self::Stream(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::Stream(err.to_string())
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<cpal::DeviceNameError> for AudioError {
    fn from(err: cpal::DeviceNameError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        Self::Host(err.to_string())
    }
}
