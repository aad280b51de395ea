//! Element data types.
//!
//! A [`DType`] is a fixed-width scalar kind repeated `nmemb` times per element.
//! Codes follow the numpy convention (`<f8`, `|u1`, ...). Only little endian
//! storage is supported; `=` is read as little endian.
//!
//! Arrow mapping:
//! - `nmemb == 1` maps to the matching primitive type (`|b1` maps to `Boolean`).
//! - `nmemb > 1` maps to `FixedSizeList(item, nmemb)`.

use std::{fmt, str::FromStr, sync::Arc};

use arrow::datatypes::{DataType, Field};
use serde::{Deserialize, Serialize};

use crate::error::{BigColError, BigColResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Width in bytes of one scalar on disk.
    pub const fn width(&self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    /// Canonical numpy style code.
    pub const fn code(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "|b1",
            ScalarKind::I8 => "|i1",
            ScalarKind::I16 => "<i2",
            ScalarKind::I32 => "<i4",
            ScalarKind::I64 => "<i8",
            ScalarKind::U8 => "|u1",
            ScalarKind::U16 => "<u2",
            ScalarKind::U32 => "<u4",
            ScalarKind::U64 => "<u8",
            ScalarKind::F32 => "<f4",
            ScalarKind::F64 => "<f8",
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self {
            ScalarKind::Bool => DataType::Boolean,
            ScalarKind::I8 => DataType::Int8,
            ScalarKind::I16 => DataType::Int16,
            ScalarKind::I32 => DataType::Int32,
            ScalarKind::I64 => DataType::Int64,
            ScalarKind::U8 => DataType::UInt8,
            ScalarKind::U16 => DataType::UInt16,
            ScalarKind::U32 => DataType::UInt32,
            ScalarKind::U64 => DataType::UInt64,
            ScalarKind::F32 => DataType::Float32,
            ScalarKind::F64 => DataType::Float64,
        }
    }

    pub fn from_arrow(data_type: &DataType) -> Option<Self> {
        let kind = match data_type {
            DataType::Boolean => ScalarKind::Bool,
            DataType::Int8 => ScalarKind::I8,
            DataType::Int16 => ScalarKind::I16,
            DataType::Int32 => ScalarKind::I32,
            DataType::Int64 => ScalarKind::I64,
            DataType::UInt8 => ScalarKind::U8,
            DataType::UInt16 => ScalarKind::U16,
            DataType::UInt32 => ScalarKind::U32,
            DataType::UInt64 => ScalarKind::U64,
            DataType::Float32 => ScalarKind::F32,
            DataType::Float64 => ScalarKind::F64,
            _ => return None,
        };
        Some(kind)
    }
}

impl FromStr for ScalarKind {
    type Err = BigColError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let body = match code.chars().next() {
            Some('<') | Some('=') | Some('|') => &code[1..],
            Some('>') => {
                return Err(BigColError::UnsupportedDataType(format!(
                    "big endian dtype '{code}'"
                )))
            }
            _ => code,
        };
        let kind = match body {
            "b1" | "?" => ScalarKind::Bool,
            "i1" => ScalarKind::I8,
            "i2" => ScalarKind::I16,
            "i4" => ScalarKind::I32,
            "i8" => ScalarKind::I64,
            "u1" => ScalarKind::U8,
            "u2" => ScalarKind::U16,
            "u4" => ScalarKind::U32,
            "u8" => ScalarKind::U64,
            "f4" => ScalarKind::F32,
            "f8" => ScalarKind::F64,
            _ => {
                return Err(BigColError::UnsupportedDataType(format!(
                    "unknown dtype code '{code}'"
                )))
            }
        };
        Ok(kind)
    }
}

/// Element type of a column: `nmemb` scalars of `kind` per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DType {
    kind: ScalarKind,
    nmemb: usize,
}

impl DType {
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self { kind, nmemb: 1 }
    }

    /// Fixed-shape element of `nmemb` scalars.
    pub fn fixed(kind: ScalarKind, nmemb: usize) -> BigColResult<Self> {
        if nmemb == 0 {
            return Err(BigColError::InvalidArgument(
                "dtype element multiplicity must be at least 1".to_string(),
            ));
        }
        Ok(Self { kind, nmemb })
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn nmemb(&self) -> usize {
        self.nmemb
    }

    /// Bytes per element.
    pub fn itemsize(&self) -> usize {
        self.kind.width() * self.nmemb
    }

    pub fn arrow_type(&self) -> DataType {
        if self.nmemb == 1 {
            self.kind.arrow_type()
        } else {
            DataType::FixedSizeList(
                Arc::new(Field::new("item", self.kind.arrow_type(), false)),
                self.nmemb as i32,
            )
        }
    }

    /// Derives the dtype of an Arrow array type. List item field names and
    /// nullability are ignored.
    pub fn from_arrow(data_type: &DataType) -> BigColResult<Self> {
        match data_type {
            DataType::FixedSizeList(field, size) if *size > 0 => {
                let kind = ScalarKind::from_arrow(field.data_type()).ok_or_else(|| {
                    BigColError::UnsupportedDataType(format!("list item type {data_type}"))
                })?;
                Self::fixed(kind, *size as usize)
            }
            other => ScalarKind::from_arrow(other)
                .map(Self::scalar)
                .ok_or_else(|| BigColError::UnsupportedDataType(other.to_string())),
        }
    }
}

impl From<ScalarKind> for DType {
    fn from(kind: ScalarKind) -> Self {
        DType::scalar(kind)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nmemb == 1 {
            write!(f, "{}", self.kind.code())
        } else {
            write!(f, "{}[{}]", self.kind.code(), self.nmemb)
        }
    }
}

/// Parses `"<f8"` or `"<f8[3]"`.
impl FromStr for DType {
    type Err = BigColError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('[') {
            Some((code, rest)) => {
                let count = rest
                    .strip_suffix(']')
                    .and_then(|n| n.trim().parse::<usize>().ok())
                    .ok_or_else(|| {
                        BigColError::UnsupportedDataType(format!("malformed dtype '{s}'"))
                    })?;
                DType::fixed(code.parse()?, count)
            }
            None => Ok(DType::scalar(s.parse()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numpy_codes() {
        assert_eq!("<i8".parse::<ScalarKind>().unwrap(), ScalarKind::I64);
        assert_eq!("f4".parse::<ScalarKind>().unwrap(), ScalarKind::F32);
        assert_eq!("=u2".parse::<ScalarKind>().unwrap(), ScalarKind::U16);
        assert_eq!("|b1".parse::<ScalarKind>().unwrap(), ScalarKind::Bool);
    }

    #[test]
    fn rejects_big_endian_and_unknown_codes() {
        assert!(matches!(
            ">f8".parse::<ScalarKind>(),
            Err(BigColError::UnsupportedDataType(_))
        ));
        assert!("S10".parse::<ScalarKind>().is_err());
    }

    #[test]
    fn fixed_shape_dtype_round_trips_through_display() {
        let dtype: DType = "<f8[3]".parse().unwrap();
        assert_eq!(dtype.nmemb(), 3);
        assert_eq!(dtype.itemsize(), 24);
        assert_eq!(dtype.to_string(), "<f8[3]");
        assert_eq!(DType::scalar(ScalarKind::I32).to_string(), "<i4");
    }

    #[test]
    fn arrow_mapping_ignores_list_field_details() {
        let user_type = DataType::FixedSizeList(
            Arc::new(Field::new("element", DataType::Float32, true)),
            2,
        );
        let dtype = DType::from_arrow(&user_type).unwrap();
        assert_eq!(dtype, DType::fixed(ScalarKind::F32, 2).unwrap());
        assert_eq!(DType::from_arrow(&dtype.arrow_type()).unwrap(), dtype);
    }

    #[test]
    fn unsupported_arrow_types_are_rejected() {
        assert!(DType::from_arrow(&DataType::Utf8).is_err());
        assert!(DType::fixed(ScalarKind::I8, 0).is_err());
    }
}
