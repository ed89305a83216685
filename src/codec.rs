//! Little-endian byte codec for the primitive widths and CIP data types
//! used throughout encapsulation, CPF, and EPATH encoding.
//!
//! All pack functions return an owned `Vec<u8>` of the exact width; all
//! unpack functions take a slice and fail with [`CipError::Encoding`] if
//! the slice is shorter than the expected width.

use crate::error::{CipError, CipResult};

macro_rules! pack_fn {
    ($name:ident, $ty:ty) => {
        pub fn $name(value: $ty) -> Vec<u8> {
            value.to_le_bytes().to_vec()
        }
    };
}

macro_rules! unpack_fn {
    ($name:ident, $ty:ty, $width:expr) => {
        pub fn $name(bytes: &[u8]) -> CipResult<$ty> {
            let slice = bytes.get(..$width).ok_or_else(|| {
                CipError::encoding(format!(
                    "expected {} bytes to unpack {}, got {}",
                    $width,
                    stringify!($ty),
                    bytes.len()
                ))
            })?;
            let mut buf = [0u8; $width];
            buf.copy_from_slice(slice);
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

pack_fn!(pack_usint, u8);
pack_fn!(pack_sint, i8);
pack_fn!(pack_uint, u16);
pack_fn!(pack_int, i16);
pack_fn!(pack_udint, u32);
pack_fn!(pack_dint, i32);
pack_fn!(pack_ulint, u64);
pack_fn!(pack_lint, i64);
pack_fn!(pack_real, f32);
pack_fn!(pack_lreal, f64);

unpack_fn!(unpack_usint, u8, 1);
unpack_fn!(unpack_sint, i8, 1);
unpack_fn!(unpack_uint, u16, 2);
unpack_fn!(unpack_int, i16, 2);
unpack_fn!(unpack_udint, u32, 4);
unpack_fn!(unpack_dint, i32, 4);
unpack_fn!(unpack_ulint, u64, 8);
unpack_fn!(unpack_lint, i64, 8);
unpack_fn!(unpack_real, f32, 4);
unpack_fn!(unpack_lreal, f64, 8);

/// CIP elementary data type identifiers (CIP Vol 1, Appendix C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CipDataType {
    Bool = 0x00C1,
    Sint = 0x00C2,
    Int = 0x00C3,
    Dint = 0x00C4,
    Lint = 0x00C5,
    Usint = 0x00C6,
    Uint = 0x00C7,
    Udint = 0x00C8,
    Ulint = 0x00C9,
    Real = 0x00CA,
    Lreal = 0x00CB,
    Byte = 0x00D1,
    Word = 0x00D2,
    Dword = 0x00D3,
    Lword = 0x00D4,
    /// Rockwell "structured" short string: 2-byte length prefix + ASCII bytes.
    String = 0x00DA,
}

impl CipDataType {
    /// Resolve a wire type id to its variant, if recognized.
    pub fn from_id(id: u16) -> Option<Self> {
        use CipDataType::*;
        Some(match id {
            0x00C1 => Bool,
            0x00C2 => Sint,
            0x00C3 => Int,
            0x00C4 => Dint,
            0x00C5 => Lint,
            0x00C6 => Usint,
            0x00C7 => Uint,
            0x00C8 => Udint,
            0x00C9 => Ulint,
            0x00CA => Real,
            0x00CB => Lreal,
            0x00D1 => Byte,
            0x00D2 => Word,
            0x00D3 => Dword,
            0x00D4 => Lword,
            0x00DA => String,
            _ => return None,
        })
    }

    /// Fixed on-wire size in bytes, for types that have one. `String` has
    /// a variable size (2-byte length prefix + payload) and returns `None`.
    pub fn fixed_size(self) -> Option<usize> {
        use CipDataType::*;
        match self {
            Bool | Sint | Usint | Byte => Some(1),
            Int | Uint | Word => Some(2),
            Dint | Udint | Dword | Real => Some(4),
            Lint | Ulint | Lword | Lreal => Some(8),
            String => None,
        }
    }
}

/// A decoded CIP value, tagged with the type it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CipValue {
    Bool(bool),
    Sint(i8),
    Int(i16),
    Dint(i32),
    Lint(i64),
    Usint(u8),
    Uint(u16),
    Udint(u32),
    Ulint(u64),
    Real(f32),
    Lreal(f64),
    Byte(u8),
    Word(u16),
    Dword(u32),
    Lword(u64),
    String(String),
}

/// Decode `bytes` as the given CIP data type, consuming exactly as many
/// bytes as the type requires. Returns [`CipError::Encoding`] for a
/// truncated buffer or unsupported type.
pub fn unpack_cip_value(data_type: CipDataType, bytes: &[u8]) -> CipResult<CipValue> {
    use CipDataType::*;
    Ok(match data_type {
        Bool => CipValue::Bool(unpack_usint(bytes)? != 0),
        Sint => CipValue::Sint(unpack_sint(bytes)?),
        Int => CipValue::Int(unpack_int(bytes)?),
        Dint => CipValue::Dint(unpack_dint(bytes)?),
        Lint => CipValue::Lint(unpack_lint(bytes)?),
        Usint => CipValue::Usint(unpack_usint(bytes)?),
        Uint => CipValue::Uint(unpack_uint(bytes)?),
        Udint => CipValue::Udint(unpack_udint(bytes)?),
        Ulint => CipValue::Ulint(unpack_ulint(bytes)?),
        Real => CipValue::Real(unpack_real(bytes)?),
        Lreal => CipValue::Lreal(unpack_lreal(bytes)?),
        Byte => CipValue::Byte(unpack_usint(bytes)?),
        Word => CipValue::Word(unpack_uint(bytes)?),
        Dword => CipValue::Dword(unpack_udint(bytes)?),
        Lword => CipValue::Lword(unpack_ulint(bytes)?),
        CipDataType::String => {
            let len = unpack_uint(bytes)? as usize;
            let payload = bytes.get(2..2 + len).ok_or_else(|| {
                CipError::encoding(format!("truncated STRING, expected {len} bytes"))
            })?;
            CipValue::String(String::from_utf8_lossy(payload).into_owned())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_round_trip() {
        for v in [0u16, 1, 0x1234, 0xFFFF] {
            assert_eq!(unpack_uint(&pack_uint(v)).unwrap(), v);
        }
    }

    #[test]
    fn udint_round_trip() {
        for v in [0u32, 1, 0x1122_3344, 0xFFFF_FFFF] {
            assert_eq!(unpack_udint(&pack_udint(v)).unwrap(), v);
        }
    }

    #[test]
    fn ulint_round_trip() {
        for v in [0u64, 1, 0x1122_3344_5566_7788, u64::MAX] {
            assert_eq!(unpack_ulint(&pack_ulint(v)).unwrap(), v);
        }
    }

    #[test]
    fn little_endian_byte_order() {
        assert_eq!(pack_uint(0x1122), vec![0x22, 0x11]);
        assert_eq!(pack_udint(0x1122_3344), vec![0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn unpack_short_buffer_errors() {
        assert!(unpack_udint(&[1, 2, 3]).is_err());
    }

    #[test]
    fn data_type_lookup() {
        assert_eq!(CipDataType::from_id(0x00C4), Some(CipDataType::Dint));
        assert_eq!(CipDataType::from_id(0xBEEF), None);
        assert_eq!(CipDataType::Dint.fixed_size(), Some(4));
        assert_eq!(CipDataType::String.fixed_size(), None);
    }

    #[test]
    fn unpack_dint_value() {
        let bytes = pack_dint(-42);
        match unpack_cip_value(CipDataType::Dint, &bytes).unwrap() {
            CipValue::Dint(v) => assert_eq!(v, -42),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
