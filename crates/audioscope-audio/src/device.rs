//! Audio device lookup.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, instrument};

use audioscope_types::SampleEncoding;

use crate::convert::cpal_format;
use crate::error::AudioError;
use crate::AudioResult;

/// Direction of an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    /// Capture device.
    Input,

    /// Playback device.
    Output,
}

/// An audio device as reported by the host.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device name, used to select it again.
    pub name: String,

    /// Whether the device captures or plays.
    pub direction: DeviceDirection,

    /// Whether this is the host's default device for its direction.
    pub is_default: bool,
}

/// Enumerate input and output devices of the default host.
#[instrument(name = "enumerate_audio_devices")]
pub fn enumerate_audio_devices() -> AudioResult<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            devices.push(AudioDeviceInfo {
                is_default: default_input.as_deref() == Some(name.as_str()),
                name,
                direction: DeviceDirection::Input,
            });
        }
    }

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    for device in host.output_devices()? {
        if let Ok(name) = device.name() {
            devices.push(AudioDeviceInfo {
                is_default: default_output.as_deref() == Some(name.as_str()),
                name,
                direction: DeviceDirection::Output,
            });
        }
    }

    debug!(count = devices.len(), "Enumerated audio devices");
    Ok(devices)
}

/// Find a capture device by name, or the default one.
pub fn find_input_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default input".to_string())),
    }
}

/// Find a playback device by name, or the default one.
pub fn find_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string())),
    }
}

/// Stream configuration for interleaved audio with the device's default buffer.
pub fn stream_config(channels: u16, sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Check that a capture device accepts the given format.
pub fn check_input_format(
    device: &cpal::Device,
    channels: u16,
    sample_rate: u32,
    encoding: SampleEncoding,
    bits: u16,
) -> AudioResult<()> {
    let format = cpal_format(encoding, bits)?;
    let supported = device.supported_input_configs()?.any(|range| {
        range.channels() == channels
            && range.sample_format() == format
            && range.min_sample_rate().0 <= sample_rate
            && sample_rate <= range.max_sample_rate().0
    });
    if supported {
        Ok(())
    } else {
        Err(AudioError::FormatNotSupported(format!(
            "input {channels}ch {sample_rate}Hz {format:?}"
        )))
    }
}

/// Check that a playback device accepts 32-bit float output in the given layout.
pub fn check_output_format(
    device: &cpal::Device,
    channels: u16,
    sample_rate: u32,
) -> AudioResult<()> {
    let supported = device.supported_output_configs()?.any(|range| {
        range.channels() == channels
            && range.sample_format() == cpal::SampleFormat::F32
            && range.min_sample_rate().0 <= sample_rate
            && sample_rate <= range.max_sample_rate().0
    });
    if supported {
        Ok(())
    } else {
        Err(AudioError::FormatNotSupported(format!(
            "output {channels}ch {sample_rate}Hz F32"
        )))
    }
}
