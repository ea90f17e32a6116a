//! Frame element types and their widened accumulators
//!
//! Detector frames are stored in narrow integer or float types. Summing many of them
//! in the storage width overflows silently, so every element type declares an
//! accumulator at least 64 bits wide. Frames are widened before summation and the
//! total is narrowed back exactly once, when the merged frame is produced.

use crate::errors::{FrameMergeError, Result};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::NcTypeDescriptor;
use std::fmt;
use std::ops::Add;

/// Numeric element type of a stored frame stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// Map a NetCDF variable type onto a supported frame element type
    ///
    /// # Errors
    ///
    /// Returns [`FrameMergeError::UnsupportedElementType`] for strings, chars and
    /// user-defined types.
    pub fn from_variable_type(vartype: &NcVariableType) -> Result<Self> {
        match vartype {
            NcVariableType::Int(IntType::U8) => Ok(Self::U8),
            NcVariableType::Int(IntType::I8) => Ok(Self::I8),
            NcVariableType::Int(IntType::U16) => Ok(Self::U16),
            NcVariableType::Int(IntType::I16) => Ok(Self::I16),
            NcVariableType::Int(IntType::U32) => Ok(Self::U32),
            NcVariableType::Int(IntType::I32) => Ok(Self::I32),
            NcVariableType::Int(IntType::U64) => Ok(Self::U64),
            NcVariableType::Int(IntType::I64) => Ok(Self::I64),
            NcVariableType::Float(FloatType::F32) => Ok(Self::F32),
            NcVariableType::Float(FloatType::F64) => Ok(Self::F64),
            other => Err(FrameMergeError::UnsupportedElementType(
                format!("{other:?}").to_lowercase(),
            )),
        }
    }

    /// Get the string representation of the element type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric type frames can be stored in and summed over
pub trait FrameElement:
    NcTypeDescriptor + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Accumulator the sum is carried in
    type Accumulator: Copy + Default + Add<Output = Self::Accumulator> + Send + Sync;

    /// Runtime tag matching this type
    const ELEMENT_TYPE: ElementType;

    /// Lossless conversion into the accumulator
    fn widen(self) -> Self::Accumulator;

    /// Conversion back to storage width; integer types saturate at their bounds
    fn narrow(total: Self::Accumulator) -> Self;
}

macro_rules! impl_integer_element {
    ($($t:ty => $acc:ty, $variant:ident;)*) => {
        $(
            impl FrameElement for $t {
                type Accumulator = $acc;
                const ELEMENT_TYPE: ElementType = ElementType::$variant;

                #[inline]
                fn widen(self) -> $acc {
                    <$acc>::from(self)
                }

                #[inline]
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                fn narrow(total: $acc) -> Self {
                    total.clamp(<$acc>::from(<$t>::MIN), <$acc>::from(<$t>::MAX)) as $t
                }
            }
        )*
    };
}

impl_integer_element! {
    u8 => i64, U8;
    i8 => i64, I8;
    u16 => i64, U16;
    i16 => i64, I16;
    u32 => i64, U32;
    i32 => i64, I32;
    u64 => i128, U64;
    i64 => i128, I64;
}

impl FrameElement for f32 {
    type Accumulator = f64;
    const ELEMENT_TYPE: ElementType = ElementType::F32;

    #[inline]
    fn widen(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn narrow(total: f64) -> Self {
        total as f32
    }
}

impl FrameElement for f64 {
    type Accumulator = f64;
    const ELEMENT_TYPE: ElementType = ElementType::F64;

    #[inline]
    fn widen(self) -> f64 {
        self
    }

    #[inline]
    fn narrow(total: f64) -> Self {
        total
    }
}
