//! Element types and the rules for converting between them.

use std::fmt;

use onnx_sema_proto::onnx;

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Float,
    Double,

    /// Strings can appear in model files but their values are never
    /// evaluated.
    String,
}

impl DataType {
    /// Convert an ONNX `TensorProto.DataType` value.
    ///
    /// Returns `None` for types that are not supported (complex numbers,
    /// bfloat16, 8-bit floats etc.)
    pub fn from_onnx(dtype: onnx::DataType) -> Option<DataType> {
        let dtype = match dtype {
            onnx::DataType::FLOAT => DataType::Float,
            onnx::DataType::UINT8 => DataType::UInt8,
            onnx::DataType::INT8 => DataType::Int8,
            onnx::DataType::UINT16 => DataType::UInt16,
            onnx::DataType::INT16 => DataType::Int16,
            onnx::DataType::INT32 => DataType::Int32,
            onnx::DataType::INT64 => DataType::Int64,
            onnx::DataType::STRING => DataType::String,
            onnx::DataType::BOOL => DataType::Bool,
            onnx::DataType::FLOAT16 => DataType::Float16,
            onnx::DataType::DOUBLE => DataType::Double,
            onnx::DataType::UINT32 => DataType::UInt32,
            onnx::DataType::UINT64 => DataType::UInt64,
            _ => return None,
        };
        Some(dtype)
    }

    /// Return the ONNX `TensorProto.DataType` value for this type.
    pub fn to_onnx(self) -> onnx::DataType {
        match self {
            DataType::Float => onnx::DataType::FLOAT,
            DataType::UInt8 => onnx::DataType::UINT8,
            DataType::Int8 => onnx::DataType::INT8,
            DataType::UInt16 => onnx::DataType::UINT16,
            DataType::Int16 => onnx::DataType::INT16,
            DataType::Int32 => onnx::DataType::INT32,
            DataType::Int64 => onnx::DataType::INT64,
            DataType::String => onnx::DataType::STRING,
            DataType::Bool => onnx::DataType::BOOL,
            DataType::Float16 => onnx::DataType::FLOAT16,
            DataType::Double => onnx::DataType::DOUBLE,
            DataType::UInt32 => onnx::DataType::UINT32,
            DataType::UInt64 => onnx::DataType::UINT64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float | DataType::Double)
    }

    /// Return true if this is a signed or unsigned integer type.
    ///
    /// Bool is not considered an integer type.
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
        )
    }

    /// Return true for types whose values can be used in arithmetic.
    pub fn is_numeric(self) -> bool {
        self.is_float() || self.is_integer()
    }

    /// Size of an element in bits.
    pub fn bits(self) -> u32 {
        match self {
            DataType::Bool | DataType::UInt8 | DataType::Int8 => 8,
            DataType::UInt16 | DataType::Int16 | DataType::Float16 => 16,
            DataType::UInt32 | DataType::Int32 | DataType::Float => 32,
            DataType::UInt64 | DataType::Int64 | DataType::Double => 64,
            DataType::String => 0,
        }
    }

    /// Return the type that values of `self` and `other` are converted to
    /// when they are combined in arithmetic with implicit promotion enabled.
    ///
    /// The rules are:
    ///
    /// - Within the unsigned chain `bool < uint8 < uint16 < uint32 < uint64`,
    ///   the signed chain `int8 < int16 < int32 < int64` and the float chain
    ///   `float16 < float32 < float64`, the wider type wins.
    /// - Mixing signed and unsigned integers widens to the narrowest signed
    ///   type that holds both. `uint64` mixed with a signed type has no such
    ///   type and promotes to `float64`.
    /// - Mixing any integer or bool with a float gives the float type.
    ///
    /// Returns `None` if either type is a string.
    pub fn promote(self, other: DataType) -> Option<DataType> {
        use DataType::*;

        if self == String || other == String {
            return None;
        }
        if self == other {
            return Some(self);
        }

        let promoted = match (self, other) {
            (a, b) if a.is_float() && b.is_float() => wider(a, b),
            (a, _) if a.is_float() => a,
            (_, b) if b.is_float() => b,
            (Bool, b) => b,
            (a, Bool) => a,
            (a, b) if a.is_signed_integer() == b.is_signed_integer() => wider(a, b),
            (a, b) => {
                let (signed, unsigned) = if a.is_signed_integer() {
                    (a, b)
                } else {
                    (b, a)
                };
                match signed_type_for_bits(unsigned.bits() * 2) {
                    Some(holds_unsigned) => wider(signed, holds_unsigned),
                    None => Double,
                }
            }
        };
        Some(promoted)
    }
}

fn wider(a: DataType, b: DataType) -> DataType {
    if a.bits() >= b.bits() {
        a
    } else {
        b
    }
}

fn signed_type_for_bits(bits: u32) -> Option<DataType> {
    match bits {
        8 => Some(DataType::Int8),
        16 => Some(DataType::Int16),
        32 => Some(DataType::Int32),
        64 => Some(DataType::Int64),
        _ => None,
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float16 => "float16",
            DataType::Float => "float32",
            DataType::Double => "float64",
            DataType::String => "string",
        };
        write!(f, "{}", name)
    }
}

/// Convert an integer to the value it has after being stored in an element of
/// type `dtype`.
///
/// Narrowing conversions keep the low bits of the value. Conversion to bool
/// tests for a non-zero value. `uint64` values are kept as their bit pattern.
pub fn wrap_int(x: i64, dtype: DataType) -> i64 {
    match dtype {
        DataType::Bool => (x != 0) as i64,
        DataType::UInt8 => x as u8 as i64,
        DataType::UInt16 => x as u16 as i64,
        DataType::UInt32 => x as u32 as i64,
        DataType::Int8 => x as i8 as i64,
        DataType::Int16 => x as i16 as i64,
        DataType::Int32 => x as i32 as i64,
        DataType::UInt64 | DataType::Int64 => x,
        DataType::Float16 | DataType::Float | DataType::Double | DataType::String => x,
    }
}

/// Convert a float to the integer value it has after a cast to `dtype`.
///
/// The value is rounded toward zero and then wrapped as by [`wrap_int`]. NaN
/// converts to zero. Conversion to bool tests for a non-zero value.
pub fn float_to_int(x: f64, dtype: DataType) -> i64 {
    if dtype == DataType::Bool {
        return (x != 0.) as i64;
    }
    let truncated = x.trunc();
    let as_int = if dtype == DataType::UInt64 && truncated >= 0. {
        truncated as u64 as i64
    } else {
        truncated as i64
    };
    wrap_int(as_int, dtype)
}

/// Round a float to the precision of float type `dtype`.
///
/// float16 values are held with float32 precision.
pub fn round_float(x: f64, dtype: DataType) -> f64 {
    match dtype {
        DataType::Float | DataType::Float16 => x as f32 as f64,
        _ => x,
    }
}

/// Convert integer `x`, stored with type `from`, to a float.
pub fn int_to_float(x: i64, from: DataType) -> f64 {
    if from == DataType::UInt64 {
        x as u64 as f64
    } else {
        x as f64
    }
}

/// Decode an IEEE 754 half-precision float.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0f32 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f32;

    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0. => sign * f32::INFINITY,
        0x1f => f32::NAN,
        _ => sign * (1. + mantissa / 1024.) * 2f32.powi(exponent - 15),
    }
}

/// Encode a float as IEEE 754 half-precision, rounding to nearest.
pub fn f32_to_f16(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        let nan_bit = if mantissa != 0 { 0x200 } else { 0 };
        return sign | 0x7c00 | nan_bit;
    }

    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exponent <= 0 {
        // Subnormal or zero.
        if half_exponent < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x80_0000;
        let shift = (14 - half_exponent) as u32;
        let round = (mantissa >> (shift - 1)) & 1;
        return sign | ((mantissa >> shift) + round) as u16;
    }

    let half = ((half_exponent as u32) << 10) | (mantissa >> 13);
    let round = (mantissa >> 12) & 1;
    sign | (half + round) as u16
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{f16_to_f32, f32_to_f16, float_to_int, wrap_int, DataType};

    #[test]
    fn test_onnx_conversion() {
        let types = [
            DataType::Bool,
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::UInt64,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Float16,
            DataType::Float,
            DataType::Double,
            DataType::String,
        ];
        for dtype in types {
            assert_eq!(DataType::from_onnx(dtype.to_onnx()), Some(dtype));
        }
    }

    #[test]
    fn test_promote() {
        use DataType::*;

        #[derive(Debug)]
        struct Case {
            a: DataType,
            b: DataType,
            expected: Option<DataType>,
        }

        let cases = [
            Case {
                a: Float,
                b: Float,
                expected: Some(Float),
            },
            Case {
                a: Float16,
                b: Double,
                expected: Some(Double),
            },
            Case {
                a: Int64,
                b: Float16,
                expected: Some(Float16),
            },
            Case {
                a: Bool,
                b: UInt8,
                expected: Some(UInt8),
            },
            Case {
                a: Int8,
                b: Int32,
                expected: Some(Int32),
            },
            Case {
                a: UInt8,
                b: Int8,
                expected: Some(Int16),
            },
            Case {
                a: Int64,
                b: UInt16,
                expected: Some(Int64),
            },
            Case {
                a: UInt32,
                b: Int16,
                expected: Some(Int64),
            },
            Case {
                a: UInt64,
                b: Int8,
                expected: Some(Double),
            },
            Case {
                a: String,
                b: Float,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.a.promote(case.b), case.expected);
            assert_eq!(case.b.promote(case.a), case.expected);
        })
    }

    #[test]
    fn test_wrap_int() {
        assert_eq!(wrap_int(300, DataType::UInt8), 44);
        assert_eq!(wrap_int(200, DataType::Int8), -56);
        assert_eq!(wrap_int(-1, DataType::UInt16), 65535);
        assert_eq!(wrap_int(5, DataType::Bool), 1);
        assert_eq!(wrap_int(i64::MAX, DataType::Int32), -1);
    }

    #[test]
    fn test_float_to_int() {
        assert_eq!(float_to_int(2.7, DataType::Int32), 2);
        assert_eq!(float_to_int(-2.7, DataType::Int32), -2);
        assert_eq!(float_to_int(0.5, DataType::Bool), 1);
        assert_eq!(float_to_int(f64::NAN, DataType::Int64), 0);
        assert_eq!(float_to_int(257.9, DataType::UInt8), 1);
    }

    #[test]
    fn test_f16_to_f32() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x3800), 0.5);
        assert_eq!(f16_to_f32(0x0000), 0.0);
        assert_eq!(f16_to_f32(0x7c00), f32::INFINITY);
        assert!(f16_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn test_f32_to_f16() {
        assert_eq!(f32_to_f16(1.5), 15872);
        assert_eq!(f32_to_f16(2.5), 16640);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(0.0), 0);
        assert_eq!(f32_to_f16(1e6), 0x7c00);
        assert_eq!(f32_to_f16(f16_to_f32(0x0001)), 0x0001);

        for bits in [0x3c00u16, 0x3555, 0x7bff, 0x0400, 0x8123] {
            assert_eq!(f32_to_f16(f16_to_f32(bits)), bits);
        }
    }
}
