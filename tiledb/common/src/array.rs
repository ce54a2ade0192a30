use std::fmt::{Display, Formatter, Result as FmtResult};
use std::num::NonZeroU32;
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "proptest-strategies")]
use proptest::prelude::*;

use crate::datatype::VAR_SIZE;
use crate::error::{Error as CommonError, ErrorKind};

/// The mode an array is opened under, keying the behavior allowed on its
/// [ArrayDescriptor][crate::key::LookupKey]-style handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Read,
    Write,
    Append,
}

/// Cell order: how cells within a tile (or, for irregular tiles, within
/// the whole array) are totally ordered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CellOrder {
    RowMajor,
    ColMajor,
    Hilbert,
}

/// Tile order: how tiles are totally ordered. `None` iff tiles are
/// irregular (§3 invariant 3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum TileOrder {
    RowMajor,
    ColMajor,
    Hilbert,
    None,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OrderError {
    #[error("unrecognized order token: {0}")]
    UnrecognizedToken(String),
}

impl From<OrderError> for CommonError {
    fn from(e: OrderError) -> Self {
        CommonError::new(ErrorKind::Parse, e.to_string())
    }
}

impl Display for CellOrder {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match self {
            CellOrder::RowMajor => "row-major",
            CellOrder::ColMajor => "column-major",
            CellOrder::Hilbert => "hilbert",
        };
        f.write_str(s)
    }
}

impl FromStr for CellOrder {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row-major" => Ok(CellOrder::RowMajor),
            "column-major" => Ok(CellOrder::ColMajor),
            "hilbert" => Ok(CellOrder::Hilbert),
            other => Err(OrderError::UnrecognizedToken(other.to_string())),
        }
    }
}

impl Display for TileOrder {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match self {
            TileOrder::RowMajor => "row-major",
            TileOrder::ColMajor => "column-major",
            TileOrder::Hilbert => "hilbert",
            TileOrder::None => "*",
        };
        f.write_str(s)
    }
}

impl FromStr for TileOrder {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row-major" => Ok(TileOrder::RowMajor),
            "column-major" => Ok(TileOrder::ColMajor),
            "hilbert" => Ok(TileOrder::Hilbert),
            "*" => Ok(TileOrder::None),
            other => Err(OrderError::UnrecognizedToken(other.to_string())),
        }
    }
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for CellOrder {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(CellOrder::RowMajor),
            Just(CellOrder::ColMajor),
            Just(CellOrder::Hilbert),
        ]
        .boxed()
    }
}

/// The number of values carried within a single cell of an attribute or
/// dimension: either a fixed positive count, or `Var` for variable-length
/// cells.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CellValNum {
    Fixed(NonZeroU32),
    Var,
}

impl CellValNum {
    pub fn single() -> Self {
        CellValNum::Fixed(NonZeroU32::new(1).unwrap())
    }

    pub fn is_var_sized(&self) -> bool {
        matches!(self, CellValNum::Var)
    }

    pub fn fixed(&self) -> Option<NonZeroU32> {
        match self {
            CellValNum::Fixed(n) => Some(*n),
            CellValNum::Var => None,
        }
    }
}

impl Display for CellValNum {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            CellValNum::Fixed(n) => write!(f, "{n}"),
            CellValNum::Var => f.write_str("var"),
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CellValNumError {
    #[error("val_num cannot be zero")]
    Zero,
}

impl TryFrom<i32> for CellValNum {
    type Error = CellValNumError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value == VAR_SIZE {
            Ok(CellValNum::Var)
        } else if value <= 0 {
            Err(CellValNumError::Zero)
        } else {
            Ok(CellValNum::Fixed(NonZeroU32::new(value as u32).unwrap()))
        }
    }
}

impl From<CellValNum> for i32 {
    fn from(value: CellValNum) -> Self {
        match value {
            CellValNum::Fixed(n) => n.get() as i32,
            CellValNum::Var => VAR_SIZE,
        }
    }
}

/// The per-attribute (and per-coordinate) compression tag. The engine
/// implements `None` and `Gzip`; `Rle`/`Lz` are accepted as reserved tags
/// per §3 but have no codec behind them yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Compression {
    None,
    Gzip,
    Rle,
    Lz,
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Rle => "rle",
            Compression::Lz => "lz",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_order_tokens_round_trip() {
        for c in [CellOrder::RowMajor, CellOrder::ColMajor, CellOrder::Hilbert]
        {
            assert_eq!(CellOrder::from_str(&c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn tile_order_tokens_round_trip() {
        for t in [
            TileOrder::RowMajor,
            TileOrder::ColMajor,
            TileOrder::Hilbert,
            TileOrder::None,
        ] {
            assert_eq!(TileOrder::from_str(&t.to_string()).unwrap(), t);
        }
    }

    #[test]
    fn cell_val_num_var_sentinel() {
        assert_eq!(CellValNum::try_from(VAR_SIZE).unwrap(), CellValNum::Var);
        assert_eq!(i32::from(CellValNum::Var), VAR_SIZE);
    }

    #[test]
    fn cell_val_num_rejects_zero() {
        assert!(CellValNum::try_from(0).is_err());
    }
}
