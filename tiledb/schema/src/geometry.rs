//! Coordinate geometry: the pure functions that map coordinates to cell
//! positions, tile positions, and tile ids under each supported order (§4.1).

use tiledb_common::array::CellOrder;
use tiledb_common::physical::PhysicalType;
use tiledb_common::{Error, Result};

use crate::hilbert;
use crate::schema::ArraySchema;

/// A coordinate type eligible to be an array's `coords_type`: `i32`, `i64`,
/// `f32`, or `f64`. Bridges the physical representation to the `f64` domain
/// arithmetic every geometry function is defined in terms of.
pub trait CoordValue: PhysicalType {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;

    /// This value's contribution to a Hilbert transpose word. Only ever
    /// called on coordinates whose schema passed validation, which forbids
    /// Hilbert order for `f32`/`f64` coordinates outright (invariant 2).
    fn as_hilbert_word(self) -> u32 {
        unreachable!(
            "Hilbert order is unreachable for this coordinate type; schema \
             validation rejects it at construction"
        )
    }
}

impl CoordValue for i32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as i32
    }

    fn as_hilbert_word(self) -> u32 {
        self as u32
    }
}

impl CoordValue for i64 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as i64
    }

    fn as_hilbert_word(self) -> u32 {
        self as u32
    }
}

impl CoordValue for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl CoordValue for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// The statically-restricted subset of [CoordValue] that Hilbert order and
/// tile-id computation are generic over (invariant 2: `f32`/`f64` "forbid
/// Hilbert and tile-id operations, the engine must assert"). Only `i32` and
/// `i64` implement it, so [tile_id] and [cell_id_hilbert] cannot even be
/// called with a float coordinate -- the assertion is a compile error, not
/// a runtime check.
pub trait IntegralCoord: CoordValue + private::Sealed {
    fn to_i64(self) -> i64;
    fn from_i64(v: i64) -> Self;
}

impl IntegralCoord for i32 {
    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_i64(v: i64) -> Self {
        v as i32
    }
}

impl IntegralCoord for i64 {
    fn to_i64(self) -> i64 {
        self
    }

    fn from_i64(v: i64) -> Self {
        v
    }
}

/// A half-open-on-neither-side (inclusive) coordinate range on one
/// dimension, in the schema's coordinate type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range<T> {
    pub lo: T,
    pub hi: T,
}

impl<T> Range<T> {
    pub fn new(lo: T, hi: T) -> Self {
        Range { lo, hi }
    }
}

/// The four-way classification [subarray_overlap] reports, with the exact
/// discriminants named in §4.1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Overlap {
    None = 0,
    Full = 1,
    Partial = 2,
    Contig = 3,
}

fn require_regular_tiles(schema: &ArraySchema) -> Result<()> {
    if schema.tile_extents().is_empty() {
        Err(Error::invalid_argument(
            "operation requires regular tiles but the schema has irregular tiles",
        ))
    } else {
        Ok(())
    }
}

/// In-tile coordinate position (§4.1 "Cell position within a tile").
/// Fails with `InvalidArgument` ("sparse"/irregular-tile schemas have no
/// fixed in-tile position).
pub fn get_cell_pos<T: CoordValue>(
    schema: &ArraySchema,
    coords: &[T],
) -> Result<u64> {
    require_regular_tiles(schema)?;
    let extents = schema.tile_extents();
    let offsets = match schema.cell_order() {
        CellOrder::ColMajor => schema.cell_offsets_col_major(),
        _ => schema.cell_offsets_row_major(),
    };

    let mut pos: u64 = 0;
    for i in 0..coords.len() {
        let dom_lo = schema.dimensions()[i].domain.0;
        let normalized = (coords[i].to_f64() - dom_lo).rem_euclid(extents[i]);
        pos += (normalized as u64) * offsets[i];
    }
    Ok(pos)
}

fn tile_coords<T: IntegralCoord>(schema: &ArraySchema, coords: &[T]) -> Vec<u64> {
    let extents = schema.tile_extents();
    coords
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let dom_lo = schema.dimensions()[i].domain.0;
            ((c.to_f64() - dom_lo) / extents[i]).floor() as u64
        })
        .collect()
}

/// Tile id under the schema's `tile_order` (§4.1 "Tile id").
pub fn tile_id<T: IntegralCoord>(schema: &ArraySchema, coords: &[T]) -> Result<u64> {
    require_regular_tiles(schema)?;
    let t = tile_coords(schema, coords);

    use tiledb_common::array::TileOrder;
    match schema.tile_order() {
        TileOrder::RowMajor => Ok(dot(&t, schema.tile_offsets_row_major())),
        TileOrder::ColMajor => Ok(dot(&t, schema.tile_offsets_col_major())),
        TileOrder::Hilbert => {
            let words: Vec<u32> = t.iter().map(|&v| v as u32).collect();
            Ok(hilbert::hilbert_index(&words, schema.hilbert_tile_bits()))
        }
        TileOrder::None => Err(Error::invalid_argument(
            "tile_id is undefined for irregular-tile schemas",
        )),
    }
}

fn dot(a: &[u64], b: &[u64]) -> u64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cell id under Hilbert order, reduced into a tile when tiles are regular
/// (§4.1 "Cell id (Hilbert, sparse / irregular)").
pub fn cell_id_hilbert<T: IntegralCoord>(
    schema: &ArraySchema,
    coords: &[T],
) -> Result<u64> {
    let words: Vec<u32> = if schema.tile_extents().is_empty() {
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let dom_lo = schema.dimensions()[i].domain.0;
                (c.to_f64() - dom_lo) as u32
            })
            .collect()
    } else {
        let extents = schema.tile_extents();
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let dom_lo = schema.dimensions()[i].domain.0;
                (c.to_f64() - dom_lo).rem_euclid(extents[i]) as u32
            })
            .collect()
    };
    Ok(hilbert::hilbert_index(&words, schema.hilbert_cell_bits()))
}

fn lexicographic_cmp<T: CoordValue>(a: &[T], b: &[T], reverse: bool) -> std::cmp::Ordering {
    use tiledb_common::physical::BitsOrd;
    let indices: Box<dyn Iterator<Item = usize>> = if reverse {
        Box::new((0..a.len()).rev())
    } else {
        Box::new(0..a.len())
    };
    for i in indices {
        match a[i].bits_cmp(&b[i]) {
            std::cmp::Ordering::Equal => continue,
            ord => return ord,
        }
    }
    std::cmp::Ordering::Equal
}

fn hilbert_word<T: CoordValue>(schema: &ArraySchema, coords: &[T]) -> u64 {
    let words: Vec<u32> = coords
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let dom_lo = schema.dimensions()[i].domain.0;
            CoordValue::as_hilbert_word(T::from_f64(c.to_f64() - dom_lo))
        })
        .collect();
    hilbert::hilbert_index(&words, schema.hilbert_cell_bits())
}

/// Total, strict order over coordinate vectors (§4.1 "Cell ordering
/// predicate"). `succeeds` is the symmetric converse.
pub fn precedes<T: CoordValue>(schema: &ArraySchema, a: &[T], b: &[T]) -> bool {
    use std::cmp::Ordering;
    let ord = match schema.cell_order() {
        CellOrder::RowMajor => lexicographic_cmp(a, b, false),
        CellOrder::ColMajor => lexicographic_cmp(a, b, true),
        CellOrder::Hilbert => {
            let (ha, hb) = (hilbert_word(schema, a), hilbert_word(schema, b));
            match ha.cmp(&hb) {
                Ordering::Equal => lexicographic_cmp(a, b, false),
                ord => ord,
            }
        }
    };
    ord == Ordering::Less
}

pub fn succeeds<T: CoordValue>(schema: &ArraySchema, a: &[T], b: &[T]) -> bool {
    precedes(schema, b, a)
}

/// §4.1 "Tile-slab containment", row-major form: every dimension except the
/// last must stay within a single tile index.
pub fn is_contained_in_tile_slab_row<T: CoordValue>(
    schema: &ArraySchema,
    range: &[Range<T>],
) -> Result<bool> {
    require_regular_tiles(schema)?;
    Ok(tile_slab_contained(schema, range, range.len().saturating_sub(1)))
}

/// Column-major form: the *first* dimension is the one left unconstrained.
pub fn is_contained_in_tile_slab_col<T: CoordValue>(
    schema: &ArraySchema,
    range: &[Range<T>],
) -> Result<bool> {
    require_regular_tiles(schema)?;
    Ok(tile_slab_contained_skip_first(schema, range))
}

fn tile_slab_contained<T: CoordValue>(
    schema: &ArraySchema,
    range: &[Range<T>],
    check_upto: usize,
) -> bool {
    let extents = schema.tile_extents();
    for i in 0..check_upto {
        let dom_lo = schema.dimensions()[i].domain.0;
        let lo_tile = ((range[i].lo.to_f64() - dom_lo) / extents[i]).floor();
        let hi_tile = ((range[i].hi.to_f64() - dom_lo) / extents[i]).floor();
        if lo_tile != hi_tile {
            return false;
        }
    }
    true
}

fn tile_slab_contained_skip_first<T: CoordValue>(
    schema: &ArraySchema,
    range: &[Range<T>],
) -> bool {
    let extents = schema.tile_extents();
    for i in 1..range.len() {
        let dom_lo = schema.dimensions()[i].domain.0;
        let lo_tile = ((range[i].lo.to_f64() - dom_lo) / extents[i]).floor();
        let hi_tile = ((range[i].hi.to_f64() - dom_lo) / extents[i]).floor();
        if lo_tile != hi_tile {
            return false;
        }
    }
    true
}

/// §4.1 "Subarray overlap classification". `a` is typically a tile's
/// bounding box, `b` the query subarray.
pub fn subarray_overlap<T: CoordValue>(
    schema: &ArraySchema,
    a: &[Range<T>],
    b: &[Range<T>],
) -> Overlap {
    let dim_num = a.len();
    let mut per_dim = Vec::with_capacity(dim_num);
    for (ra, rb) in a.iter().zip(b.iter()) {
        let (alo, ahi) = (ra.lo.to_f64(), ra.hi.to_f64());
        let (blo, bhi) = (rb.lo.to_f64(), rb.hi.to_f64());
        if ahi < blo || bhi < alo {
            per_dim.push(Overlap::None);
        } else if blo <= alo && ahi <= bhi {
            per_dim.push(Overlap::Full);
        } else {
            per_dim.push(Overlap::Partial);
        }
    }

    if per_dim.iter().any(|o| matches!(o, Overlap::None)) {
        return Overlap::None;
    }
    if per_dim.iter().all(|o| matches!(o, Overlap::Full)) {
        return Overlap::Full;
    }

    use tiledb_common::array::CellOrder as CO;
    let except = match schema.cell_order() {
        CO::ColMajor => dim_num.saturating_sub(1),
        CO::RowMajor | CO::Hilbert => 0,
    };
    let rest_full = per_dim
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != except)
        .all(|(_, o)| matches!(o, Overlap::Full));

    if rest_full {
        Overlap::Contig
    } else {
        Overlap::Partial
    }
}

/// §4.1 "Expand domain to tile boundaries". No-op for irregular tiles.
/// Regular tiles only ever coexist with integral `coords_type` (invariant
/// 2's float restriction), so the inclusive-upper-bound arithmetic here
/// (`-1`) is always exercised on integer-valued coordinates in practice.
pub fn expand_domain<T: CoordValue>(schema: &ArraySchema, d: &mut [Range<T>]) {
    if schema.tile_extents().is_empty() {
        return;
    }
    let extents = schema.tile_extents().to_vec();
    for (i, r) in d.iter_mut().enumerate() {
        let (dom_lo, dom_hi) = schema.dimensions()[i].domain;
        let extent = extents[i];
        let lo = r.lo.to_f64();
        let hi = r.hi.to_f64();
        let tile_lo = ((lo - dom_lo) / extent).floor();
        let tile_hi = ((hi - dom_lo) / extent).floor();
        let new_lo = (dom_lo + tile_lo * extent).max(dom_lo);
        let new_hi = (dom_lo + (tile_hi + 1.0) * extent - 1.0).min(dom_hi);
        r.lo = T::from_f64(new_lo);
        r.hi = T::from_f64(new_hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{default_compression, AttributeData};
    use crate::dimension::DimensionData;
    use tiledb_common::array::{CellOrder, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};

    fn irregular_schema(cell_order: CellOrder) -> ArraySchema {
        ArraySchema::new(
            "geo",
            vec![AttributeData::new(
                "a",
                CellType::Int32,
                tiledb_common::array::CellValNum::single(),
            )],
            vec![
                DimensionData::new("x", 0.0, 99.0),
                DimensionData::new("y", 0.0, 99.0),
            ],
            CoordsType::Int32,
            cell_order,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            default_compression(1),
        )
        .unwrap()
    }

    fn regular_schema() -> ArraySchema {
        ArraySchema::new(
            "geo_reg",
            vec![],
            vec![
                DimensionData::new("x", 0.0, 3.0),
                DimensionData::new("y", 0.0, 3.0),
            ],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            vec![2.0, 2.0],
            10,
            10,
            default_compression(0),
        )
        .unwrap()
    }

    #[test]
    fn precedes_is_total_and_strict() {
        let schema = irregular_schema(CellOrder::RowMajor);
        let a = [3i32, 4];
        let b = [1i32, 2];
        assert!(!precedes(&schema, &a, &a));
        assert!(precedes(&schema, &b, &a) != precedes(&schema, &a, &b));
    }

    #[test]
    fn row_major_is_lexicographic() {
        let schema = irregular_schema(CellOrder::RowMajor);
        assert!(precedes(&schema, &[1i32, 99], &[2i32, 0]));
    }

    #[test]
    fn col_major_compares_last_dimension_first() {
        let schema = irregular_schema(CellOrder::ColMajor);
        // Trailing dimension (compared first under col-major) decides it,
        // even though the leading dimension orders the other way.
        assert!(precedes(&schema, &[5i32, 1], &[1i32, 2]));
    }

    #[test]
    fn hilbert_matches_forward_scan_order_of_s3() {
        let schema = ArraySchema::new(
            "s3",
            vec![],
            vec![
                DimensionData::new("x", 0.0, 7.0),
                DimensionData::new("y", 0.0, 7.0),
            ],
            CoordsType::Int32,
            CellOrder::Hilbert,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            default_compression(0),
        )
        .unwrap();
        let order = [[0i32, 0], [0, 1], [1, 1], [1, 0]];
        for w in order.windows(2) {
            assert!(precedes(&schema, &w[0], &w[1]));
        }
    }

    #[test]
    fn tile_slab_containment_row_ignores_last_dimension() {
        let schema = regular_schema();
        let range = [Range::new(0i32, 1), Range::new(0i32, 3)];
        assert!(is_contained_in_tile_slab_row(&schema, &range).unwrap());
        let range = [Range::new(0i32, 2), Range::new(0i32, 1)];
        assert!(!is_contained_in_tile_slab_row(&schema, &range).unwrap());
    }

    #[test]
    fn subarray_overlap_classifies_none_full_partial() {
        let schema = regular_schema();
        let tile = [Range::new(0i32, 1), Range::new(0i32, 1)];
        let disjoint = [Range::new(5i32, 6), Range::new(5i32, 6)];
        assert_eq!(
            subarray_overlap(&schema, &tile, &disjoint) as i32,
            Overlap::None as i32
        );

        let superset = [Range::new(0i32, 3), Range::new(0i32, 3)];
        assert_eq!(
            subarray_overlap(&schema, &tile, &superset) as i32,
            Overlap::Full as i32
        );

        let partial = [Range::new(0i32, 1), Range::new(1i32, 2)];
        assert_eq!(
            subarray_overlap(&schema, &tile, &partial) as i32,
            Overlap::Partial as i32
        );
    }

    #[test]
    fn expand_domain_snaps_to_tile_edges() {
        let schema = regular_schema();
        let mut range = [Range::new(1i32, 2), Range::new(0i32, 0)];
        expand_domain(&schema, &mut range);
        assert_eq!(range[0], Range::new(0, 3));
        assert_eq!(range[1], Range::new(0, 1));
    }

    #[test]
    fn get_cell_pos_rejects_irregular_schema() {
        let schema = irregular_schema(CellOrder::RowMajor);
        assert!(get_cell_pos(&schema, &[1i32, 1]).is_err());
    }
}
