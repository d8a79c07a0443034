//! Raw device bytes to normalized float samples.
//!
//! A converter is chosen once, when a source is opened, from the device's
//! (encoding, width) pair. Integer samples are mapped linearly so that the
//! smallest representable value becomes -1.0 and the largest +1.0; 32-bit
//! float data is passed through unchanged. Raw buffers are native-endian,
//! as delivered by the device driver.

use std::marker::PhantomData;

use audioscope_types::SampleEncoding;

use crate::error::AudioError;
use crate::AudioResult;

/// Converts raw device bytes into normalized `f32` samples.
pub trait SampleConverter: Send {
    /// Width of one raw sample in bytes.
    fn bytes_per_sample(&self) -> usize;

    /// Replace `dest` with the samples decoded from `raw`.
    ///
    /// Trailing bytes that do not form a whole sample are ignored.
    fn convert(&mut self, raw: &[u8], dest: &mut Vec<f32>);
}

/// Integer sample types with a fixed native-endian layout.
pub trait IntSample: Copy + Send + 'static {
    const SIZE: usize;
    const MIN: f64;
    const MAX: f64;

    fn read_ne(bytes: &[u8]) -> Self;
    fn to_f64(self) -> f64;
}

macro_rules! impl_int_sample {
    ($($t:ty),*) => {
        $(
            impl IntSample for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const MIN: f64 = <$t>::MIN as f64;
                const MAX: f64 = <$t>::MAX as f64;

                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_int_sample!(i16, i32, u16, u32);

/// Map an integer sample onto [-1, 1].
pub fn normalize<T: IntSample>(value: T) -> f32 {
    ((value.to_f64() - T::MIN) / (T::MAX - T::MIN) * 2.0 - 1.0) as f32
}

/// Integer to float converter for one sample type.
pub struct IntToFloat<T> {
    _sample: PhantomData<T>,
}

impl<T> IntToFloat<T> {
    pub fn new() -> Self {
        Self {
            _sample: PhantomData,
        }
    }
}

impl<T> Default for IntToFloat<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IntSample> SampleConverter for IntToFloat<T> {
    fn bytes_per_sample(&self) -> usize {
        T::SIZE
    }

    fn convert(&mut self, raw: &[u8], dest: &mut Vec<f32>) {
        dest.clear();
        dest.extend(
            raw.chunks_exact(T::SIZE)
                .map(|chunk| normalize(T::read_ne(chunk))),
        );
    }
}

/// Pass-through for native 32-bit float data.
#[derive(Debug, Default)]
pub struct FloatPassthrough;

impl SampleConverter for FloatPassthrough {
    fn bytes_per_sample(&self) -> usize {
        4
    }

    fn convert(&mut self, raw: &[u8], dest: &mut Vec<f32>) {
        dest.clear();
        dest.extend(raw.chunks_exact(4).map(|chunk| {
            f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        }));
    }
}

/// Select the converter for a device's sample encoding.
pub fn make_converter(
    encoding: SampleEncoding,
    bits: u16,
) -> AudioResult<Box<dyn SampleConverter>> {
    match (encoding, bits) {
        (SampleEncoding::SignedInt, 16) => Ok(Box::new(IntToFloat::<i16>::new())),
        (SampleEncoding::SignedInt, 32) => Ok(Box::new(IntToFloat::<i32>::new())),
        (SampleEncoding::UnsignedInt, 16) => Ok(Box::new(IntToFloat::<u16>::new())),
        (SampleEncoding::UnsignedInt, 32) => Ok(Box::new(IntToFloat::<u32>::new())),
        (SampleEncoding::Float, 32) => Ok(Box::new(FloatPassthrough)),
        _ => Err(AudioError::UnsupportedFormat { encoding, bits }),
    }
}

/// The cpal sample format matching an encoding, if converters support it.
pub fn cpal_format(encoding: SampleEncoding, bits: u16) -> AudioResult<cpal::SampleFormat> {
    match (encoding, bits) {
        (SampleEncoding::SignedInt, 16) => Ok(cpal::SampleFormat::I16),
        (SampleEncoding::SignedInt, 32) => Ok(cpal::SampleFormat::I32),
        (SampleEncoding::UnsignedInt, 16) => Ok(cpal::SampleFormat::U16),
        (SampleEncoding::UnsignedInt, 32) => Ok(cpal::SampleFormat::U32),
        (SampleEncoding::Float, 32) => Ok(cpal::SampleFormat::F32),
        _ => Err(AudioError::UnsupportedFormat { encoding, bits }),
    }
}

/// The encoding and width of a cpal sample format.
pub fn encoding_of(format: cpal::SampleFormat) -> (SampleEncoding, u16) {
    let bits = (format.sample_size() * 8) as u16;
    let encoding = if format.is_float() {
        SampleEncoding::Float
    } else if format.is_uint() {
        SampleEncoding::UnsignedInt
    } else {
        SampleEncoding::SignedInt
    };
    (encoding, bits)
}
