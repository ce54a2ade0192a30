use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error as CommonError, ErrorKind};

/// Sentinel used for a variable-length `val_num` or cell size, matching
/// the wire constant `VAR_SIZE = i32::MAX`.
pub const VAR_SIZE: i32 = i32::MAX;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("unrecognized type token: {0}")]
    UnrecognizedToken(String),
    #[error("coordinates may not have type char")]
    CharCoordinates,
    #[error(
        "datatype {0} cannot participate in Hilbert order or tile-id computation"
    )]
    NotIntegral(CellType),
}

impl From<Error> for CommonError {
    fn from(e: Error) -> Self {
        CommonError::new(ErrorKind::Schema, e.to_string())
    }
}

/// The closed sum of types an attribute (or, restricted further, a
/// coordinate) cell value may hold.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CellType {
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl CellType {
    /// Size in bytes of a single value of this type.
    pub const fn size(&self) -> usize {
        match self {
            CellType::Char | CellType::Int8 | CellType::UInt8 => 1,
            CellType::Int16 | CellType::UInt16 => 2,
            CellType::Int32 | CellType::UInt32 | CellType::Float32 => 4,
            CellType::Int64 | CellType::UInt64 | CellType::Float64 => 8,
        }
    }

    pub const fn is_char(&self) -> bool {
        matches!(self, CellType::Char)
    }

    /// Whether this type may serve as the array's `coords_type`: one of
    /// `{i32,i64,f32,f64}`, per §3; `char` and the other integer widths
    /// are attribute-only.
    pub const fn is_coords_eligible(&self) -> bool {
        matches!(
            self,
            CellType::Int32
                | CellType::Int64
                | CellType::Float32
                | CellType::Float64
        )
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match self {
            CellType::Char => "char",
            CellType::Int8 => "int8",
            CellType::UInt8 => "uint8",
            CellType::Int16 => "int16",
            CellType::UInt16 => "uint16",
            CellType::Int32 => "int",
            CellType::UInt32 => "uint32",
            CellType::Int64 => "int64",
            CellType::UInt64 => "uint64",
            CellType::Float32 => "float",
            CellType::Float64 => "double",
        };
        f.write_str(s)
    }
}

impl FromStr for CellType {
    type Err = Error;

    /// Parses the CSV wire-form type tokens from §6: `char, int, int64,
    /// float, double` are the only tokens the textual grammar accepts;
    /// the wider integer family is reachable only via the structured
    /// constructor.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char" => Ok(CellType::Char),
            "int" => Ok(CellType::Int32),
            "int64" => Ok(CellType::Int64),
            "float" => Ok(CellType::Float32),
            "double" => Ok(CellType::Float64),
            other => Err(Error::UnrecognizedToken(other.to_string())),
        }
    }
}

/// The four types a schema's shared `coords_type` may take. A strict
/// subset of [CellType] -- `char` is never a valid coordinate type, and
/// `i8/u8/i16/u16/u32/u64` are attribute-only widths.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CoordsType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl CoordsType {
    pub const fn size(&self) -> usize {
        match self {
            CoordsType::Int32 | CoordsType::Float32 => 4,
            CoordsType::Int64 | CoordsType::Float64 => 8,
        }
    }

    /// True for the two integer coordinate types; Hilbert order and
    /// tile-id computation are only ever invoked through this predicate's
    /// `true` arm (see [crate::physical::PhysicalType] bound
    /// `IntegralCoord` in `tiledb-schema`).
    pub const fn is_integral(&self) -> bool {
        matches!(self, CoordsType::Int32 | CoordsType::Int64)
    }

    pub const fn as_cell_type(&self) -> CellType {
        match self {
            CoordsType::Int32 => CellType::Int32,
            CoordsType::Int64 => CellType::Int64,
            CoordsType::Float32 => CellType::Float32,
            CoordsType::Float64 => CellType::Float64,
        }
    }
}

impl Display for CoordsType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        Display::fmt(&self.as_cell_type(), f)
    }
}

impl FromStr for CoordsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match CellType::from_str(s)? {
            CellType::Char => Err(Error::CharCoordinates),
            CellType::Int32 => Ok(CoordsType::Int32),
            CellType::Int64 => Ok(CoordsType::Int64),
            CellType::Float32 => Ok(CoordsType::Float32),
            CellType::Float64 => Ok(CoordsType::Float64),
            other => Err(Error::UnrecognizedToken(other.to_string())),
        }
    }
}

impl TryFrom<CellType> for CoordsType {
    type Error = Error;

    fn try_from(value: CellType) -> Result<Self, Self::Error> {
        match value {
            CellType::Char => Err(Error::CharCoordinates),
            CellType::Int32 => Ok(CoordsType::Int32),
            CellType::Int64 => Ok(CoordsType::Int64),
            CellType::Float32 => Ok(CoordsType::Float32),
            CellType::Float64 => Ok(CoordsType::Float64),
            other => Err(Error::NotIntegral(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_tokens_round_trip() {
        for (tok, ty) in [
            ("char", CellType::Char),
            ("int", CellType::Int32),
            ("int64", CellType::Int64),
            ("float", CellType::Float32),
            ("double", CellType::Float64),
        ] {
            assert_eq!(CellType::from_str(tok).unwrap(), ty);
        }
    }

    #[test]
    fn char_rejected_as_coords() {
        assert_eq!(CoordsType::from_str("char"), Err(Error::CharCoordinates));
    }

    #[test]
    fn unknown_token_rejected() {
        assert!(CellType::from_str("blob").is_err());
    }

    #[test]
    fn coords_type_sizes() {
        assert_eq!(CoordsType::Int32.size(), 4);
        assert_eq!(CoordsType::Int64.size(), 8);
        assert_eq!(CoordsType::Float32.size(), 4);
        assert_eq!(CoordsType::Float64.size(), 8);
    }
}
