use std::str::FromStr;

use thiserror::Error;

use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
use tiledb_common::datatype::{CellType, CoordsType};
use tiledb_common::key::LookupKey;
use tiledb_common::{Error as CommonError, ErrorKind, Result};

use crate::attribute::{default_compression, AttributeData};
use crate::dimension::DimensionData;

/// Default `capacity` for a CSV schema whose capacity field is `*`.
pub const DEFAULT_CAPACITY: u64 = 10_000;
/// Default `consolidation_step` for a CSV schema whose field is `*`.
pub const DEFAULT_CONSOLIDATION_STEP: u32 = 10;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SchemaError {
    #[error("array name must be alphanumeric/underscore, got {0:?}")]
    InvalidArrayName(String),
    #[error("duplicate field name: {0}")]
    DuplicateName(String),
    #[error("schema must have at least one dimension")]
    NoDimensions,
    #[error("dimension {name} domain [{lo},{hi}] is empty or inverted")]
    InvalidDomain { name: String, lo: f64, hi: f64 },
    #[error(
        "coords_type {coords_type} is not integral, which forbids \
         {what} (invariant 2)"
    )]
    FloatForbidden {
        coords_type: CoordsType,
        what: &'static str,
    },
    #[error("tile_extents.len() ({got}) must equal dim_num ({want})")]
    TileExtentCountMismatch { got: usize, want: usize },
    #[error("tile extent on dimension {name} must be in (0, {range}], got {extent}")]
    InvalidTileExtent {
        name: String,
        extent: f64,
        range: f64,
    },
    #[error("irregular tiles (empty tile_extents) require tile_order = None")]
    IrregularTilesNeedNoTileOrder,
    #[error("regular tiles (non-empty tile_extents) require tile_order != None")]
    RegularTilesNeedTileOrder,
    #[error("capacity must be positive")]
    ZeroCapacity,
    #[error("consolidation_step must be positive")]
    ZeroConsolidationStep,
    #[error(
        "compression.len() ({got}) must equal attributes.len() + 1 ({want})"
    )]
    CompressionCountMismatch { got: usize, want: usize },
    #[error("malformed schema CSV line: {0}")]
    MalformedCsv(String),
}

impl From<SchemaError> for CommonError {
    fn from(e: SchemaError) -> Self {
        CommonError::new(ErrorKind::Schema, e.to_string())
    }
}

/// The array schema (§3). Immutable after construction; every derived
/// quantity in §4.1 is computed once here and cached.
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySchema {
    array_name: String,
    attributes: Vec<AttributeData>,
    dimensions: Vec<DimensionData>,
    coords_type: CoordsType,
    cell_order: CellOrder,
    tile_order: TileOrder,
    tile_extents: Vec<f64>,
    capacity: u64,
    consolidation_step: u32,
    compression: Vec<Compression>,

    cell_sizes: Vec<i32>,
    coords_size: usize,
    hilbert_cell_bits: u32,
    hilbert_tile_bits: u32,
    tile_partitions: Vec<u64>,
    tile_offsets_row_major: Vec<u64>,
    tile_offsets_col_major: Vec<u64>,
    cell_offsets_row_major: Vec<u64>,
    cell_offsets_col_major: Vec<u64>,
}

/// Running products `offsets[i] = prod(counts[j] for j > i)` -- row-major /
/// C-order strides, the same shape used for both tile ids (over tile
/// partition counts) and in-tile cell position (over tile extents).
fn row_major_offsets(counts: &[u64]) -> Vec<u64> {
    let n = counts.len();
    let mut offsets = vec![1u64; n];
    for i in (0..n.saturating_sub(1)).rev() {
        offsets[i] = offsets[i + 1] * counts[i + 1];
    }
    offsets
}

/// `offsets[i] = prod(counts[j] for j < i)` -- column-major strides.
fn col_major_offsets(counts: &[u64]) -> Vec<u64> {
    let n = counts.len();
    let mut offsets = vec![1u64; n];
    for i in 1..n {
        offsets[i] = offsets[i - 1] * counts[i - 1];
    }
    offsets
}

fn ceil_log2(x: f64) -> u32 {
    if x <= 1.0 {
        0
    } else {
        x.log2().ceil() as u32
    }
}

fn valid_array_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ArraySchema {
    /// Structured constructor: validates every invariant in §3 and computes
    /// the derived quantities in §4.1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        array_name: impl Into<String>,
        attributes: Vec<AttributeData>,
        dimensions: Vec<DimensionData>,
        coords_type: CoordsType,
        cell_order: CellOrder,
        tile_order: TileOrder,
        tile_extents: Vec<f64>,
        capacity: u64,
        consolidation_step: u32,
        compression: Vec<Compression>,
    ) -> Result<Self> {
        let array_name = array_name.into();
        Self::validate(
            &array_name,
            &attributes,
            &dimensions,
            coords_type,
            cell_order,
            tile_order,
            &tile_extents,
            capacity,
            consolidation_step,
            &compression,
        )?;

        let dim_num = dimensions.len();
        let cell_sizes = attributes
            .iter()
            .map(|a| match a.val_num {
                CellValNum::Var => tiledb_common::datatype::VAR_SIZE,
                CellValNum::Fixed(n) => n.get() as i32 * a.cell_type.size() as i32,
            })
            .collect();
        let coords_size = dim_num * coords_type.size();

        let regular = !tile_extents.is_empty();
        let tile_partitions: Vec<u64> = if regular {
            dimensions
                .iter()
                .zip(tile_extents.iter())
                .map(|(d, &extent)| (d.range() / extent).ceil() as u64)
                .collect()
        } else {
            Vec::new()
        };

        let hilbert_cell_max = if regular {
            tile_extents.iter().cloned().fold(0.0, f64::max)
        } else {
            dimensions.iter().map(|d| d.range()).fold(0.0, f64::max)
        };
        let hilbert_cell_bits = ceil_log2(hilbert_cell_max).max(1);
        let hilbert_tile_bits = if regular {
            ceil_log2(tile_partitions.iter().cloned().max().unwrap_or(1) as f64).max(1)
        } else {
            0
        };

        let (tile_offsets_row_major, tile_offsets_col_major) = if regular {
            (
                row_major_offsets(&tile_partitions),
                col_major_offsets(&tile_partitions),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let (cell_offsets_row_major, cell_offsets_col_major) = if regular {
            let extent_counts: Vec<u64> =
                tile_extents.iter().map(|&e| e as u64).collect();
            (
                row_major_offsets(&extent_counts),
                col_major_offsets(&extent_counts),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(ArraySchema {
            array_name,
            attributes,
            dimensions,
            coords_type,
            cell_order,
            tile_order,
            tile_extents,
            capacity,
            consolidation_step,
            compression,
            cell_sizes,
            coords_size,
            hilbert_cell_bits,
            hilbert_tile_bits,
            tile_partitions,
            tile_offsets_row_major,
            tile_offsets_col_major,
            cell_offsets_row_major,
            cell_offsets_col_major,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn validate(
        array_name: &str,
        attributes: &[AttributeData],
        dimensions: &[DimensionData],
        coords_type: CoordsType,
        cell_order: CellOrder,
        tile_order: TileOrder,
        tile_extents: &[f64],
        capacity: u64,
        consolidation_step: u32,
        compression: &[Compression],
    ) -> std::result::Result<(), SchemaError> {
        if !valid_array_name(array_name) {
            return Err(SchemaError::InvalidArrayName(array_name.to_string()));
        }
        if dimensions.is_empty() {
            return Err(SchemaError::NoDimensions);
        }

        // Invariant 1: distinct names across the union.
        let mut seen = std::collections::HashSet::new();
        for name in attributes
            .iter()
            .map(|a| a.name.as_str())
            .chain(dimensions.iter().map(|d| d.name.as_str()))
        {
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateName(name.to_string()));
            }
        }

        for d in dimensions {
            if !(d.domain.0 < d.domain.1) {
                return Err(SchemaError::InvalidDomain {
                    name: d.name.clone(),
                    lo: d.domain.0,
                    hi: d.domain.1,
                });
            }
        }

        // Invariant 2: float coords forbid Hilbert order and regular tiles
        // (tile-id computation), in either cell or tile role.
        if !coords_type.is_integral() {
            if cell_order == CellOrder::Hilbert {
                return Err(SchemaError::FloatForbidden {
                    coords_type,
                    what: "Hilbert cell order",
                });
            }
            if tile_order == TileOrder::Hilbert {
                return Err(SchemaError::FloatForbidden {
                    coords_type,
                    what: "Hilbert tile order",
                });
            }
            if !tile_extents.is_empty() {
                return Err(SchemaError::FloatForbidden {
                    coords_type,
                    what: "regular (tiled) partitioning",
                });
            }
        }

        // Invariant 3.
        if tile_extents.is_empty() {
            if tile_order != TileOrder::None {
                return Err(SchemaError::IrregularTilesNeedNoTileOrder);
            }
            if capacity == 0 {
                return Err(SchemaError::ZeroCapacity);
            }
        } else {
            if tile_order == TileOrder::None {
                return Err(SchemaError::RegularTilesNeedTileOrder);
            }
            if tile_extents.len() != dimensions.len() {
                return Err(SchemaError::TileExtentCountMismatch {
                    got: tile_extents.len(),
                    want: dimensions.len(),
                });
            }
            for (d, &extent) in dimensions.iter().zip(tile_extents.iter()) {
                let range = d.range();
                if !(extent > 0.0 && extent <= range) {
                    return Err(SchemaError::InvalidTileExtent {
                        name: d.name.clone(),
                        extent,
                        range,
                    });
                }
            }
        }

        if consolidation_step == 0 {
            return Err(SchemaError::ZeroConsolidationStep);
        }

        // Invariant 5.
        if compression.len() != attributes.len() + 1 {
            return Err(SchemaError::CompressionCountMismatch {
                got: compression.len(),
                want: attributes.len() + 1,
            });
        }

        Ok(())
    }

    pub fn array_name(&self) -> &str {
        &self.array_name
    }

    pub fn attributes(&self) -> &[AttributeData] {
        &self.attributes
    }

    pub fn dimensions(&self) -> &[DimensionData] {
        &self.dimensions
    }

    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    pub fn attribute_num(&self) -> usize {
        self.attributes.len()
    }

    pub fn coords_type(&self) -> CoordsType {
        self.coords_type
    }

    pub fn cell_order(&self) -> CellOrder {
        self.cell_order
    }

    pub fn tile_order(&self) -> TileOrder {
        self.tile_order
    }

    pub fn tile_extents(&self) -> &[f64] {
        &self.tile_extents
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn consolidation_step(&self) -> u32 {
        self.consolidation_step
    }

    pub fn compression(&self) -> &[Compression] {
        &self.compression
    }

    pub fn coords_compression(&self) -> Compression {
        *self.compression.last().expect("invariant 5 guarantees non-empty")
    }

    /// Per-attribute cell size, or [tiledb_common::datatype::VAR_SIZE] for
    /// variable-sized attributes (§4.1 "Derived quantities").
    pub fn cell_sizes(&self) -> &[i32] {
        &self.cell_sizes
    }

    pub fn coords_size(&self) -> usize {
        self.coords_size
    }

    /// Whole-cell size: the sentinel [tiledb_common::datatype::VAR_SIZE] if
    /// any attribute is variable-sized (invariant 4), else the sum of every
    /// attribute's fixed `cell_sizes` entry.
    pub fn cell_size(&self) -> i32 {
        if self.attributes.iter().any(|a| a.is_var_sized()) {
            tiledb_common::datatype::VAR_SIZE
        } else {
            self.cell_sizes.iter().sum()
        }
    }

    pub fn hilbert_cell_bits(&self) -> u32 {
        self.hilbert_cell_bits
    }

    pub fn hilbert_tile_bits(&self) -> u32 {
        self.hilbert_tile_bits
    }

    pub fn tile_offsets_row_major(&self) -> &[u64] {
        &self.tile_offsets_row_major
    }

    pub fn tile_offsets_col_major(&self) -> &[u64] {
        &self.tile_offsets_col_major
    }

    pub fn cell_offsets_row_major(&self) -> &[u64] {
        &self.cell_offsets_row_major
    }

    pub fn cell_offsets_col_major(&self) -> &[u64] {
        &self.cell_offsets_col_major
    }

    pub fn tile_partitions(&self) -> &[u64] {
        &self.tile_partitions
    }

    pub fn is_regular(&self) -> bool {
        !self.tile_extents.is_empty()
    }

    pub fn attribute_index(&self, key: impl Into<LookupKey>) -> Result<usize> {
        match key.into() {
            LookupKey::Index(i) => {
                if i < self.attributes.len() {
                    Ok(i)
                } else {
                    Err(CommonError::invalid_argument(format!("index {i} out of range")))
                }
            }
            LookupKey::Name(name) => self
                .attributes
                .iter()
                .position(|a| a.name == name)
                .ok_or_else(|| CommonError::invalid_argument(format!(
                    "no such attribute: {name}"
                ))),
        }
    }

    pub fn dimension_index(&self, key: impl Into<LookupKey>) -> Result<usize> {
        match key.into() {
            LookupKey::Index(i) => {
                if i < self.dimensions.len() {
                    Ok(i)
                } else {
                    Err(CommonError::invalid_argument(format!("index {i} out of range")))
                }
            }
            LookupKey::Name(name) => self
                .dimensions
                .iter()
                .position(|d| d.name == name)
                .ok_or_else(|| CommonError::invalid_argument(format!(
                    "no such dimension: {name}"
                ))),
        }
    }
}

// --- CSV wire form (§6) -----------------------------------------------

impl ArraySchema {
    /// Parses the single-line CSV wire form from §6. Compression is not
    /// part of this grammar; CSV-sourced schemas always get
    /// `Compression::None` throughout (see `DESIGN.md`).
    pub fn from_csv(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split(',').collect();
        let mut it = fields.into_iter();

        let mut next = |what: &'static str| -> Result<&str> {
            it.next()
                .ok_or_else(|| SchemaError::MalformedCsv(format!("missing {what}")).into())
        };

        let array_name = next("array_name")?.to_string();

        let attribute_num: usize = next("attribute_num")?
            .parse()
            .map_err(|_| SchemaError::MalformedCsv("attribute_num".into()))?;
        let attr_names: Vec<String> = (0..attribute_num)
            .map(|_| next("attribute name").map(str::to_string))
            .collect::<Result<_>>()?;

        let dim_num: usize = next("dim_num")?
            .parse()
            .map_err(|_| SchemaError::MalformedCsv("dim_num".into()))?;
        let dim_names: Vec<String> = (0..dim_num)
            .map(|_| next("dimension name").map(str::to_string))
            .collect::<Result<_>>()?;

        let mut dimensions = Vec::with_capacity(dim_num);
        for name in dim_names {
            let lo: f64 = next("dom_lo")?
                .parse()
                .map_err(|_| SchemaError::MalformedCsv("dom_lo".into()))?;
            let hi: f64 = next("dom_hi")?
                .parse()
                .map_err(|_| SchemaError::MalformedCsv("dom_hi".into()))?;
            dimensions.push(DimensionData::new(name, lo, hi));
        }

        let mut attributes = Vec::with_capacity(attribute_num);
        for name in attr_names {
            let tok = next("attribute type")?;
            let (ty_tok, val_num) = match tok.split_once(':') {
                Some((ty, "var")) => (ty, CellValNum::Var),
                Some((ty, n)) => {
                    let n: i32 = n
                        .parse()
                        .map_err(|_| SchemaError::MalformedCsv("val_num".into()))?;
                    let val_num = CellValNum::try_from(n)
                        .map_err(|e| SchemaError::MalformedCsv(e.to_string()))?;
                    (ty, val_num)
                }
                None => (tok, CellValNum::single()),
            };
            let cell_type = CellType::from_str(ty_tok)
                .map_err(|e| SchemaError::MalformedCsv(e.to_string()))?;
            attributes.push(AttributeData::new(name, cell_type, val_num));
        }

        let coords_type = CoordsType::from_str(next("coords_type")?)
            .map_err(|e| SchemaError::MalformedCsv(e.to_string()))?;

        let first_extent = next("tile_extents")?;
        let tile_extents = if first_extent == "*" {
            Vec::new()
        } else {
            let mut v = Vec::with_capacity(dim_num);
            v.push(
                first_extent
                    .parse::<f64>()
                    .map_err(|_| SchemaError::MalformedCsv("tile_extent".into()))?,
            );
            for _ in 1..dim_num {
                v.push(
                    next("tile_extent")?
                        .parse()
                        .map_err(|_| SchemaError::MalformedCsv("tile_extent".into()))?,
                );
            }
            v
        };

        let cell_order_tok = next("cell_order")?;
        let cell_order = if cell_order_tok == "*" {
            CellOrder::RowMajor
        } else {
            CellOrder::from_str(cell_order_tok)
                .map_err(|e| SchemaError::MalformedCsv(e.to_string()))?
        };

        let tile_order = TileOrder::from_str(next("tile_order")?)
            .map_err(|e| SchemaError::MalformedCsv(e.to_string()))?;

        let capacity_tok = next("capacity")?;
        let capacity = if capacity_tok == "*" {
            DEFAULT_CAPACITY
        } else {
            capacity_tok
                .parse()
                .map_err(|_| SchemaError::MalformedCsv("capacity".into()))?
        };

        let step_tok = next("consolidation_step")?;
        let consolidation_step = if step_tok == "*" {
            DEFAULT_CONSOLIDATION_STEP
        } else {
            step_tok
                .parse()
                .map_err(|_| SchemaError::MalformedCsv("consolidation_step".into()))?
        };

        let compression = default_compression(attributes.len() + 1);

        ArraySchema::new(
            array_name,
            attributes,
            dimensions,
            coords_type,
            cell_order,
            tile_order,
            tile_extents,
            capacity,
            consolidation_step,
            compression,
        )
    }

    /// Renders this schema back to the §6 CSV grammar. Always lossy on
    /// compression, per `from_csv`'s doc comment.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.array_name);
        out.push(',');

        out.push_str(&self.attributes.len().to_string());
        for a in &self.attributes {
            out.push(',');
            out.push_str(&a.name);
        }

        out.push(',');
        out.push_str(&self.dimensions.len().to_string());
        for d in &self.dimensions {
            out.push(',');
            out.push_str(&d.name);
        }
        for d in &self.dimensions {
            out.push(',');
            out.push_str(&d.domain.0.to_string());
            out.push(',');
            out.push_str(&d.domain.1.to_string());
        }

        for a in &self.attributes {
            out.push(',');
            out.push_str(&a.cell_type.to_string());
            match a.val_num {
                CellValNum::Var => out.push_str(":var"),
                CellValNum::Fixed(n) if n.get() == 1 => {}
                CellValNum::Fixed(n) => {
                    out.push(':');
                    out.push_str(&n.get().to_string());
                }
            }
        }

        out.push(',');
        out.push_str(&self.coords_type.to_string());

        out.push(',');
        if self.tile_extents.is_empty() {
            out.push('*');
        } else {
            let rendered: Vec<String> =
                self.tile_extents.iter().map(|e| e.to_string()).collect();
            out.push_str(&rendered.join(","));
        }

        out.push(',');
        out.push_str(&self.cell_order.to_string());
        out.push(',');
        out.push_str(&self.tile_order.to_string());
        out.push(',');
        out.push_str(&self.capacity.to_string());
        out.push(',');
        out.push_str(&self.consolidation_step.to_string());

        out
    }
}

// --- Binary schema format (tagged lengths/strings/enum bytes) ---------

fn cell_type_tag(t: CellType) -> u8 {
    match t {
        CellType::Char => 0,
        CellType::Int8 => 1,
        CellType::UInt8 => 2,
        CellType::Int16 => 3,
        CellType::UInt16 => 4,
        CellType::Int32 => 5,
        CellType::UInt32 => 6,
        CellType::Int64 => 7,
        CellType::UInt64 => 8,
        CellType::Float32 => 9,
        CellType::Float64 => 10,
    }
}

fn cell_type_from_tag(tag: u8) -> Result<CellType> {
    Ok(match tag {
        0 => CellType::Char,
        1 => CellType::Int8,
        2 => CellType::UInt8,
        3 => CellType::Int16,
        4 => CellType::UInt16,
        5 => CellType::Int32,
        6 => CellType::UInt32,
        7 => CellType::Int64,
        8 => CellType::UInt64,
        9 => CellType::Float32,
        10 => CellType::Float64,
        other => {
            return Err(CommonError::codec(format!("unknown cell_type tag {other}")))
        }
    })
}

fn coords_type_tag(t: CoordsType) -> u8 {
    match t {
        CoordsType::Int32 => 0,
        CoordsType::Int64 => 1,
        CoordsType::Float32 => 2,
        CoordsType::Float64 => 3,
    }
}

fn coords_type_from_tag(tag: u8) -> Result<CoordsType> {
    Ok(match tag {
        0 => CoordsType::Int32,
        1 => CoordsType::Int64,
        2 => CoordsType::Float32,
        3 => CoordsType::Float64,
        other => {
            return Err(CommonError::codec(format!("unknown coords_type tag {other}")))
        }
    })
}

fn cell_order_tag(o: CellOrder) -> u8 {
    match o {
        CellOrder::RowMajor => 0,
        CellOrder::ColMajor => 1,
        CellOrder::Hilbert => 2,
    }
}

fn cell_order_from_tag(tag: u8) -> Result<CellOrder> {
    Ok(match tag {
        0 => CellOrder::RowMajor,
        1 => CellOrder::ColMajor,
        2 => CellOrder::Hilbert,
        other => {
            return Err(CommonError::codec(format!("unknown cell_order tag {other}")))
        }
    })
}

fn tile_order_tag(o: TileOrder) -> u8 {
    match o {
        TileOrder::RowMajor => 0,
        TileOrder::ColMajor => 1,
        TileOrder::Hilbert => 2,
        TileOrder::None => 3,
    }
}

fn tile_order_from_tag(tag: u8) -> Result<TileOrder> {
    Ok(match tag {
        0 => TileOrder::RowMajor,
        1 => TileOrder::ColMajor,
        2 => TileOrder::Hilbert,
        3 => TileOrder::None,
        other => {
            return Err(CommonError::codec(format!("unknown tile_order tag {other}")))
        }
    })
}

fn compression_tag(c: Compression) -> u8 {
    match c {
        Compression::None => 0,
        Compression::Gzip => 1,
        Compression::Rle => 2,
        Compression::Lz => 3,
    }
}

fn compression_from_tag(tag: u8) -> Result<Compression> {
    Ok(match tag {
        0 => Compression::None,
        1 => Compression::Gzip,
        2 => Compression::Rle,
        3 => Compression::Lz,
        other => {
            return Err(CommonError::codec(format!("unknown compression tag {other}")))
        }
    })
}

struct Writer(Vec<u8>);

impl Writer {
    fn new() -> Self {
        Writer(Vec::new())
    }

    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.0.extend_from_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(CommonError::codec("schema buffer truncated"));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CommonError::codec(format!("invalid utf-8 in schema: {e}")))
    }
}

impl ArraySchema {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.string(&self.array_name);

        w.u32(self.attributes.len() as u32);
        for a in &self.attributes {
            w.string(&a.name);
            w.u8(cell_type_tag(a.cell_type));
            w.i32(i32::from(a.val_num));
        }

        w.u32(self.dimensions.len() as u32);
        for d in &self.dimensions {
            w.string(&d.name);
            w.f64(d.domain.0);
            w.f64(d.domain.1);
        }

        w.u8(coords_type_tag(self.coords_type));

        w.u32(self.tile_extents.len() as u32);
        for &e in &self.tile_extents {
            w.f64(e);
        }

        w.u8(cell_order_tag(self.cell_order));
        w.u8(tile_order_tag(self.tile_order));
        w.u64(self.capacity);
        w.u32(self.consolidation_step);

        w.u32(self.compression.len() as u32);
        for &c in &self.compression {
            w.u8(compression_tag(c));
        }

        w.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let array_name = r.string()?;

        let attribute_num = r.u32()? as usize;
        let mut attributes = Vec::with_capacity(attribute_num);
        for _ in 0..attribute_num {
            let name = r.string()?;
            let cell_type = cell_type_from_tag(r.u8()?)?;
            let val_num = CellValNum::try_from(r.i32()?)
                .map_err(|e| CommonError::codec(e.to_string()))?;
            attributes.push(AttributeData::new(name, cell_type, val_num));
        }

        let dim_num = r.u32()? as usize;
        let mut dimensions = Vec::with_capacity(dim_num);
        for _ in 0..dim_num {
            let name = r.string()?;
            let lo = r.f64()?;
            let hi = r.f64()?;
            dimensions.push(DimensionData::new(name, lo, hi));
        }

        let coords_type = coords_type_from_tag(r.u8()?)?;

        let tile_extent_num = r.u32()? as usize;
        let mut tile_extents = Vec::with_capacity(tile_extent_num);
        for _ in 0..tile_extent_num {
            tile_extents.push(r.f64()?);
        }

        let cell_order = cell_order_from_tag(r.u8()?)?;
        let tile_order = tile_order_from_tag(r.u8()?)?;
        let capacity = r.u64()?;
        let consolidation_step = r.u32()?;

        let compression_num = r.u32()? as usize;
        let mut compression = Vec::with_capacity(compression_num);
        for _ in 0..compression_num {
            compression.push(compression_from_tag(r.u8()?)?);
        }

        ArraySchema::new(
            array_name,
            attributes,
            dimensions,
            coords_type,
            cell_order,
            tile_order,
            tile_extents,
            capacity,
            consolidation_step,
            compression,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s4_schema() -> ArraySchema {
        ArraySchema::new(
            "s4",
            vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
            vec![
                DimensionData::new("x", 0.0, 3.0),
                DimensionData::new("y", 0.0, 3.0),
            ],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            vec![2.0, 2.0],
            100,
            10,
            default_compression(2),
        )
        .unwrap()
    }

    #[test]
    fn s4_tile_id_and_cell_pos() {
        let schema = s4_schema();
        let coords = [2i32, 1];
        let tid = crate::geometry::tile_id(&schema, &coords).unwrap();
        assert_eq!(tid, 2);
        let pos = crate::geometry::get_cell_pos(&schema, &coords).unwrap();
        assert_eq!(pos, 1);
    }

    #[test]
    fn binary_round_trip() {
        let schema = s4_schema();
        let bytes = schema.to_bytes();
        let decoded = ArraySchema::from_bytes(&bytes).unwrap();
        assert_eq!(schema, decoded);
    }

    #[test]
    fn csv_round_trip_with_default_compression() {
        let schema = s4_schema();
        let csv = schema.to_csv();
        let decoded = ArraySchema::from_csv(&csv).unwrap();
        assert_eq!(schema, decoded);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ArraySchema::new(
            "dup",
            vec![AttributeData::new("x", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 10.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            default_compression(1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn rejects_hilbert_with_float_coords() {
        let err = ArraySchema::new(
            "f",
            vec![],
            vec![DimensionData::new("x", 0.0, 10.0)],
            CoordsType::Float64,
            CellOrder::Hilbert,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            default_compression(0),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn rejects_regular_tiles_with_float_coords() {
        let err = ArraySchema::new(
            "f",
            vec![],
            vec![DimensionData::new("x", 0.0, 10.0)],
            CoordsType::Float64,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            vec![2.0],
            10,
            10,
            default_compression(0),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }
}
