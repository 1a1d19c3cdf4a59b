//! Native scalar types, typed buffers and the conversion policy applied when
//! interpolated values are written to an output buffer.

use std::fmt;
use std::str::FromStr;

use half::f16;

use crate::enums::ScalarKind;
use crate::error::ResliceError;

/// Largest magnitude used when clamping into Float32/Float64 storage.
pub const FLOAT_CLAMP_LIMIT: f64 = 1.2e38;

/// A numeric type that can be stored in a [`ScalarBuffer`].
///
/// `Pod` lets the nearest-neighbour fast path copy whole pixels as raw bytes.
pub trait Scalar: bytemuck::Pod + Default + Send + Sync + 'static {
    const KIND: ScalarKind;

    fn to_f64(self) -> f64;

    /// Converts without clamping: integers round half up and saturate,
    /// floats are cast.
    fn from_f64(value: f64) -> Self;

    fn into_buffer(data: Vec<Self>) -> ScalarBuffer;

    fn slice_of(buffer: &ScalarBuffer) -> Option<&[Self]>;
}

macro_rules! impl_integer_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const KIND: ScalarKind = ScalarKind::$variant;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    (value + 0.5).floor() as $t
                }

                fn into_buffer(data: Vec<Self>) -> ScalarBuffer {
                    ScalarBuffer::$variant(data)
                }

                fn slice_of(buffer: &ScalarBuffer) -> Option<&[Self]> {
                    match buffer {
                        ScalarBuffer::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_integer_scalar!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
);

macro_rules! impl_float_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const KIND: ScalarKind = ScalarKind::$variant;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn into_buffer(data: Vec<Self>) -> ScalarBuffer {
                    ScalarBuffer::$variant(data)
                }

                fn slice_of(buffer: &ScalarBuffer) -> Option<&[Self]> {
                    match buffer {
                        ScalarBuffer::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_float_scalar!(f32 => Float32, f64 => Float64);

impl Scalar for f16 {
    const KIND: ScalarKind = ScalarKind::Float16;

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn into_buffer(data: Vec<Self>) -> ScalarBuffer {
        ScalarBuffer::Float16(data)
    }

    fn slice_of(buffer: &ScalarBuffer) -> Option<&[Self]> {
        match buffer {
            ScalarBuffer::Float16(data) => Some(data),
            _ => None,
        }
    }
}

/// A flat, owned scalar array of one storage kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarBuffer {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Runs `$body` with `$data` bound to the typed vector inside a [`ScalarBuffer`].
///
/// Works on both `&ScalarBuffer` and `&mut ScalarBuffer`.
macro_rules! dispatch_buffer {
    ($buffer:expr, $data:ident => $body:expr) => {
        match $buffer {
            $crate::scalar::ScalarBuffer::Int8($data) => $body,
            $crate::scalar::ScalarBuffer::UInt8($data) => $body,
            $crate::scalar::ScalarBuffer::Int16($data) => $body,
            $crate::scalar::ScalarBuffer::UInt16($data) => $body,
            $crate::scalar::ScalarBuffer::Int32($data) => $body,
            $crate::scalar::ScalarBuffer::UInt32($data) => $body,
            $crate::scalar::ScalarBuffer::Float16($data) => $body,
            $crate::scalar::ScalarBuffer::Float32($data) => $body,
            $crate::scalar::ScalarBuffer::Float64($data) => $body,
        }
    };
}

pub(crate) use dispatch_buffer;

impl ScalarBuffer {
    /// Allocate a zero-filled buffer of `len` scalars.
    pub fn zeros(kind: ScalarKind, len: usize) -> Self {
        match kind {
            ScalarKind::Int8 => Self::Int8(vec![0; len]),
            ScalarKind::UInt8 => Self::UInt8(vec![0; len]),
            ScalarKind::Int16 => Self::Int16(vec![0; len]),
            ScalarKind::UInt16 => Self::UInt16(vec![0; len]),
            ScalarKind::Int32 => Self::Int32(vec![0; len]),
            ScalarKind::UInt32 => Self::UInt32(vec![0; len]),
            ScalarKind::Float16 => Self::Float16(vec![f16::ZERO; len]),
            ScalarKind::Float32 => Self::Float32(vec![0.0; len]),
            ScalarKind::Float64 => Self::Float64(vec![0.0; len]),
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Int8(_) => ScalarKind::Int8,
            Self::UInt8(_) => ScalarKind::UInt8,
            Self::Int16(_) => ScalarKind::Int16,
            Self::UInt16(_) => ScalarKind::UInt16,
            Self::Int32(_) => ScalarKind::Int32,
            Self::UInt32(_) => ScalarKind::UInt32,
            Self::Float16(_) => ScalarKind::Float16,
            Self::Float32(_) => ScalarKind::Float32,
            Self::Float64(_) => ScalarKind::Float64,
        }
    }

    pub fn len(&self) -> usize {
        dispatch_buffer!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at flat index `index`, widened to `f64`.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        dispatch_buffer!(self, data => data.get(index).map(|&v| Scalar::to_f64(v)))
    }

    /// Smallest and largest finite value stored, `None` for an empty buffer.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        dispatch_buffer!(self, data => data
            .iter()
            .map(|&v| Scalar::to_f64(v))
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            }))
    }
}

impl<T: Scalar> From<Vec<T>> for ScalarBuffer {
    fn from(data: Vec<T>) -> Self {
        T::into_buffer(data)
    }
}

/// Representable value range of a storage kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 9] = [
        ScalarKind::Int8,
        ScalarKind::UInt8,
        ScalarKind::Int16,
        ScalarKind::UInt16,
        ScalarKind::Int32,
        ScalarKind::UInt32,
        ScalarKind::Float16,
        ScalarKind::Float32,
        ScalarKind::Float64,
    ];

    /// Exact representable range. Float32/Float64 use a finite sentinel
    /// instead of infinity.
    pub fn range(self) -> ScalarRange {
        let (min, max) = match self {
            ScalarKind::Int8 => (i8::MIN as f64, i8::MAX as f64),
            ScalarKind::UInt8 => (0.0, u8::MAX as f64),
            ScalarKind::Int16 => (i16::MIN as f64, i16::MAX as f64),
            ScalarKind::UInt16 => (0.0, u16::MAX as f64),
            ScalarKind::Int32 => (i32::MIN as f64, i32::MAX as f64),
            ScalarKind::UInt32 => (0.0, u32::MAX as f64),
            ScalarKind::Float16 => (f16::MIN.to_f64(), f16::MAX.to_f64()),
            ScalarKind::Float32 | ScalarKind::Float64 => (-FLOAT_CLAMP_LIMIT, FLOAT_CLAMP_LIMIT),
        };
        ScalarRange { min, max }
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            ScalarKind::Float16 | ScalarKind::Float32 | ScalarKind::Float64
        )
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            ScalarKind::Int8 | ScalarKind::UInt8 => 1,
            ScalarKind::Int16 | ScalarKind::UInt16 | ScalarKind::Float16 => 2,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 4,
            ScalarKind::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Int8 => "int8",
            ScalarKind::UInt8 => "uint8",
            ScalarKind::Int16 => "int16",
            ScalarKind::UInt16 => "uint16",
            ScalarKind::Int32 => "int32",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::Float16 => "float16",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarKind {
    type Err = ResliceError;

    /// Accepts canonical names (`uint8`), Rust names (`u8`) and typed-array
    /// names (`Uint8Array`).
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let kind = match tag.to_ascii_lowercase().as_str() {
            "int8" | "i8" | "int8array" => ScalarKind::Int8,
            "uint8" | "u8" | "uint8array" | "uint8clampedarray" => ScalarKind::UInt8,
            "int16" | "i16" | "int16array" => ScalarKind::Int16,
            "uint16" | "u16" | "uint16array" => ScalarKind::UInt16,
            "int32" | "i32" | "int32array" => ScalarKind::Int32,
            "uint32" | "u32" | "uint32array" => ScalarKind::UInt32,
            "float16" | "f16" | "float16array" => ScalarKind::Float16,
            "float32" | "f32" | "float32array" => ScalarKind::Float32,
            "float64" | "f64" | "float64array" => ScalarKind::Float64,
            _ => return Err(ResliceError::UnsupportedScalarKind(tag.to_string())),
        };
        Ok(kind)
    }
}

/// The per-run converter from `f64` samples into output storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Conversion {
    Round,
    ClampRound { min: f64, max: f64 },
}

impl Conversion {
    /// Converts `src` into `dst` element by element; lengths must match.
    #[inline]
    pub fn apply<U: Scalar>(&self, src: &[f64], dst: &mut [U]) {
        match *self {
            Conversion::Round => {
                for (out, &value) in dst.iter_mut().zip(src) {
                    *out = U::from_f64(value);
                }
            }
            Conversion::ClampRound { min, max } => {
                for (out, &value) in dst.iter_mut().zip(src) {
                    *out = U::from_f64(value.clamp(min, max));
                }
            }
        }
    }
}

/// Shift/scale applied to interpolated values and whether the result must be
/// clamped into the destination range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionPolicy {
    pub shift: f64,
    pub scale: f64,
    pub clamp_required: bool,
    destination: ScalarKind,
}

impl ConversionPolicy {
    pub fn resolve(
        source: ScalarKind,
        destination: ScalarKind,
        shift: f64,
        scale: f64,
        force_clamp: bool,
    ) -> Self {
        let mut clamp_required = force_clamp;
        if !force_clamp && !destination.is_floating() {
            let input = source.range();
            let mut check_min = (input.min + shift) * scale;
            let mut check_max = (input.max + shift) * scale;
            if check_min > check_max {
                std::mem::swap(&mut check_min, &mut check_max);
            }
            let output = destination.range();
            clamp_required = check_min < output.min || check_max > output.max;
        }
        Self {
            shift,
            scale,
            clamp_required,
            destination,
        }
    }

    pub fn destination(&self) -> ScalarKind {
        self.destination
    }

    pub fn needs_rescale(&self) -> bool {
        self.shift != 0.0 || self.scale != 1.0
    }

    pub fn rescale(&self, values: &mut [f64]) {
        for value in values {
            *value = (*value + self.shift) * self.scale;
        }
    }

    pub fn converter(&self) -> Conversion {
        if self.clamp_required {
            let range = self.destination.range();
            Conversion::ClampRound {
                min: range.min,
                max: range.max,
            }
        } else {
            Conversion::Round
        }
    }
}
