use std::fmt::Debug;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tiff::tags::SampleFormat;

use crate::error::{CogWindowError, Result};

/// Byte order of the multi-byte samples stored in a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    LittleEndian,
    BigEndian,
}

/// Numeric element type of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Resolve the element type from the TIFF `SampleFormat` and `BitsPerSample` tags.
    pub fn from_tiff(sample_format: SampleFormat, bits_per_sample: u16) -> Result<Self> {
        let dtype = match (sample_format, bits_per_sample) {
            (SampleFormat::Uint, 8) => Self::UInt8,
            (SampleFormat::Int, 8) => Self::Int8,
            (SampleFormat::Uint, 16) => Self::UInt16,
            (SampleFormat::Int, 16) => Self::Int16,
            (SampleFormat::Uint, 32) => Self::UInt32,
            (SampleFormat::Int, 32) => Self::Int32,
            (SampleFormat::IEEEFP, 32) => Self::Float32,
            (SampleFormat::IEEEFP, 64) => Self::Float64,
            (format, bits) => {
                return Err(CogWindowError::Decode(format!(
                    "unsupported sample format {format:?} with {bits} bits per sample"
                )))
            }
        };
        Ok(dtype)
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// A pixel element type that tiles can be decoded into.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Reinterpret raw decompressed bytes as samples.
    fn read_samples(bytes: &[u8], byte_order: Endianness) -> Result<Vec<Self>>;

    fn to_f64(self) -> f64;

    /// Convert back from the resampler's working type. Integers round and saturate.
    fn from_f64(value: f64) -> Self;
}

fn check_len(len: usize, dtype: DataType) -> Result<usize> {
    let size = dtype.size_bytes();
    if len % size != 0 {
        return Err(CogWindowError::Decode(format!(
            "{len} bytes is not a whole number of {dtype:?} samples"
        )));
    }
    Ok(len / size)
}

impl Sample for u8 {
    const DATA_TYPE: DataType = DataType::UInt8;

    fn read_samples(bytes: &[u8], _byte_order: Endianness) -> Result<Vec<Self>> {
        Ok(bytes.to_vec())
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as u8
    }
}

impl Sample for i8 {
    const DATA_TYPE: DataType = DataType::Int8;

    fn read_samples(bytes: &[u8], _byte_order: Endianness) -> Result<Vec<Self>> {
        Ok(bytes.iter().map(|b| *b as i8).collect())
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i8
    }
}

macro_rules! impl_multibyte_sample {
    ($ty:ty, $dtype:expr, $read_into:ident, $from_f64:expr) => {
        impl Sample for $ty {
            const DATA_TYPE: DataType = $dtype;

            fn read_samples(bytes: &[u8], byte_order: Endianness) -> Result<Vec<Self>> {
                let count = check_len(bytes.len(), Self::DATA_TYPE)?;
                let mut out = vec![<$ty>::default(); count];
                match byte_order {
                    Endianness::LittleEndian => LittleEndian::$read_into(bytes, &mut out),
                    Endianness::BigEndian => BigEndian::$read_into(bytes, &mut out),
                }
                Ok(out)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                let convert: fn(f64) -> $ty = $from_f64;
                convert(value)
            }
        }
    };
}

// `as` from float to int saturates (NaN becomes 0).
impl_multibyte_sample!(u16, DataType::UInt16, read_u16_into, |v| v.round() as u16);
impl_multibyte_sample!(i16, DataType::Int16, read_i16_into, |v| v.round() as i16);
impl_multibyte_sample!(u32, DataType::UInt32, read_u32_into, |v| v.round() as u32);
impl_multibyte_sample!(i32, DataType::Int32, read_i32_into, |v| v.round() as i32);
impl_multibyte_sample!(f32, DataType::Float32, read_f32_into, |v| v as f32);
impl_multibyte_sample!(f64, DataType::Float64, read_f64_into, |v| v);
