use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use arrow::datatypes::{
    ArrowPrimitiveType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use num_traits::{Num, NumCast};

use crate::errors::{CoreError, Result};

///
/// A count as it is stored on disk: stores keep either integer or floating point counts.
///
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CountValue {
    Int(i64),
    Float(f64),
}

impl CountValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            CountValue::Int(n) => n as f64,
            CountValue::Float(n) => n,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            CountValue::Int(n) => n == 0,
            CountValue::Float(n) => n == 0.0,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CountValue::Float(_))
    }
}

impl Display for CountValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountValue::Int(n) => write!(f, "{}", n),
            CountValue::Float(n) => write!(f, "{}", n),
        }
    }
}

/// Integer sums that no longer fit an `i64` continue as floats.
impl std::ops::Add for CountValue {
    type Output = CountValue;

    fn add(self, rhs: CountValue) -> CountValue {
        match (self, rhs) {
            (CountValue::Int(a), CountValue::Int(b)) => a
                .checked_add(b)
                .map_or(CountValue::Float(a as f64 + b as f64), CountValue::Int),
            (a, b) => CountValue::Float(a.as_f64() + b.as_f64()),
        }
    }
}

///
/// Element type of materialized outputs, mirroring the usual array dtypes.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl CountType {
    pub fn name(&self) -> &'static str {
        match self {
            CountType::Int8 => "int8",
            CountType::Int16 => "int16",
            CountType::Int32 => "int32",
            CountType::Int64 => "int64",
            CountType::UInt8 => "uint8",
            CountType::UInt16 => "uint16",
            CountType::UInt32 => "uint32",
            CountType::UInt64 => "uint64",
            CountType::Float32 => "float32",
            CountType::Float64 => "float64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CountType::Float32 | CountType::Float64)
    }
}

impl FromStr for CountType {
    type Err = CoreError;

    /// Accepts dtype names as well as the `int`/`float` shorthands.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int8" => Ok(CountType::Int8),
            "int16" => Ok(CountType::Int16),
            "int" | "int32" => Ok(CountType::Int32),
            "int64" => Ok(CountType::Int64),
            "uint8" => Ok(CountType::UInt8),
            "uint16" => Ok(CountType::UInt16),
            "uint32" => Ok(CountType::UInt32),
            "uint64" => Ok(CountType::UInt64),
            "float32" => Ok(CountType::Float32),
            "float" | "float64" => Ok(CountType::Float64),
            _ => Err(CoreError::UnknownCountType(s.to_string())),
        }
    }
}

impl Display for CountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

///
/// Numeric types pixel counts can be materialized as.
///
/// Conversions are checked: integer targets reject fractional, non-finite and
/// out-of-range values instead of truncating them.
///
pub trait Count:
    Copy + Debug + Display + Default + PartialOrd + Num + NumCast + Send + Sync + 'static
{
    const COUNT_TYPE: CountType;

    type ArrowType: ArrowPrimitiveType<Native = Self>;

    fn from_f64(value: f64) -> Result<Self>;

    fn from_count(value: CountValue) -> Result<Self>;

    fn to_f64(self) -> f64;

    /// Integer view used for exact integer sums; `None` for floats and values beyond `i64`.
    fn to_i64(self) -> Option<i64>;

    fn is_nan(self) -> bool;

    fn is_infinite(self) -> bool;

    fn is_float() -> bool {
        Self::COUNT_TYPE.is_float()
    }
}

fn cast_error(value: impl Display, dtype: CountType) -> CoreError {
    CoreError::Cast {
        value: value.to_string(),
        dtype: dtype.name(),
    }
}

macro_rules! impl_int_count {
    ($ty:ty, $count_type:expr, $arrow:ty) => {
        impl Count for $ty {
            const COUNT_TYPE: CountType = $count_type;

            type ArrowType = $arrow;

            fn from_f64(value: f64) -> Result<Self> {
                if !value.is_finite() || value.fract() != 0.0 {
                    return Err(cast_error(value, Self::COUNT_TYPE));
                }
                <$ty as NumCast>::from(value).ok_or_else(|| cast_error(value, Self::COUNT_TYPE))
            }

            fn from_count(value: CountValue) -> Result<Self> {
                match value {
                    CountValue::Int(n) => <$ty as NumCast>::from(n)
                        .ok_or_else(|| cast_error(n, Self::COUNT_TYPE)),
                    CountValue::Float(n) => Self::from_f64(n),
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i64(self) -> Option<i64> {
                <i64 as NumCast>::from(self)
            }

            fn is_nan(self) -> bool {
                false
            }

            fn is_infinite(self) -> bool {
                false
            }
        }
    };
}

macro_rules! impl_float_count {
    ($ty:ty, $count_type:expr, $arrow:ty) => {
        impl Count for $ty {
            const COUNT_TYPE: CountType = $count_type;

            type ArrowType = $arrow;

            fn from_f64(value: f64) -> Result<Self> {
                Ok(value as $ty)
            }

            fn from_count(value: CountValue) -> Result<Self> {
                Ok(value.as_f64() as $ty)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i64(self) -> Option<i64> {
                None
            }

            fn is_nan(self) -> bool {
                <$ty>::is_nan(self)
            }

            fn is_infinite(self) -> bool {
                <$ty>::is_infinite(self)
            }
        }
    };
}

impl_int_count!(i8, CountType::Int8, Int8Type);
impl_int_count!(i16, CountType::Int16, Int16Type);
impl_int_count!(i32, CountType::Int32, Int32Type);
impl_int_count!(i64, CountType::Int64, Int64Type);
impl_int_count!(u8, CountType::UInt8, UInt8Type);
impl_int_count!(u16, CountType::UInt16, UInt16Type);
impl_int_count!(u32, CountType::UInt32, UInt32Type);
impl_int_count!(u64, CountType::UInt64, UInt64Type);
impl_float_count!(f32, CountType::Float32, Float32Type);
impl_float_count!(f64, CountType::Float64, Float64Type);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_integer_conversion_rejects_fractions() {
        assert_eq!(i32::from_f64(3.0).unwrap(), 3);
        assert!(i32::from_f64(3.5).is_err());
        assert!(i32::from_f64(f64::NAN).is_err());
        assert!(u8::from_count(CountValue::Int(300)).is_err());
        assert!(u32::from_count(CountValue::Int(-1)).is_err());
        assert_eq!(u8::from_count(CountValue::Float(7.0)).unwrap(), 7);
    }

    #[rstest]
    fn test_cast_error_message() {
        let err = i32::from_f64(0.25).unwrap_err();
        assert_eq!(err.to_string(), "failed to cast 0.25 to a int32");
    }

    #[rstest]
    fn test_float_conversion() {
        assert_eq!(f64::from_count(CountValue::Int(5)).unwrap(), 5.0);
        assert!(f32::from_f64(f64::NAN).unwrap().is_nan());
        assert!(<f64 as Count>::is_float());
        assert!(!<i64 as Count>::is_float());
    }

    #[rstest]
    #[case("int", CountType::Int32)]
    #[case("float", CountType::Float64)]
    #[case("uint16", CountType::UInt16)]
    fn test_count_type_from_str(#[case] name: &str, #[case] expected: CountType) {
        assert_eq!(name.parse::<CountType>().unwrap(), expected);
    }

    #[rstest]
    fn test_count_value_add() {
        assert_eq!(CountValue::Int(2) + CountValue::Int(3), CountValue::Int(5));
        assert_eq!(CountValue::Int(2) + CountValue::Float(0.5), CountValue::Float(2.5));
        assert_eq!(
            CountValue::Int(i64::MAX) + CountValue::Int(2),
            CountValue::Float(i64::MAX as f64 + 2.0)
        );
    }
}
