//! Audio capture, playback and the capture pump.
//!
//! Sources read interleaved audio from a device and normalize it to `f32`.
//! The pump moves each block from a source to the published sample stream
//! and on to an output sink, whose clock tells consumers what is audible.

mod convert;
mod device;
mod error;
mod playback;
mod pump;
mod sink;
mod source;

pub use convert::{
    cpal_format, encoding_of, make_converter, normalize, FloatPassthrough, IntSample, IntToFloat,
    SampleConverter,
};
pub use device::{
    check_input_format, check_output_format, enumerate_audio_devices, find_input_device,
    find_output_device, AudioDeviceInfo, DeviceDirection,
};
pub use error::AudioError;
pub use playback::CpalPlayback;
pub use pump::{
    downmix_to_mono, AudioPump, PumpExit, PumpStartError, PumpStats, PumpStatsSnapshot,
};
pub use sink::{
    DeviceClock, DeviceSink, DropStats, NullClock, NullSink, OutputSink, PlaybackDevice,
    PlaybackPosition, SharedClock, SinkClock,
};
pub use source::{AudioSource, CpalSource};

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
