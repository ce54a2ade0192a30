use std::collections::HashMap;
use std::rc::Rc;

use tiledb_collection::{CellSource, ConsolidatingCollection, FileCollection};
use tiledb_common::array::CellOrder;
use tiledb_common::{Error as CommonError, Result};
use tiledb_schema::geometry::CoordValue;
use tiledb_schema::{coords_type_go, integral_coords_type_go, ArraySchema};

use crate::descriptor::{DescriptorTable, OpenMode};
use crate::error::StorageError;
use crate::fragment;
use crate::fragment_io::FragmentCellSource;
use crate::vfs::Vfs;

fn require_read_mode(mode: OpenMode) -> Result<()> {
    if mode != OpenMode::Read {
        return Err(StorageError::InvalidMode.into());
    }
    Ok(())
}

fn cell_in_range(schema: &ArraySchema, coords_bytes: &[u8], range: &[(f64, f64)]) -> bool {
    coords_type_go!(schema, T, {
        let values: Vec<T> = tiledb_cell::read_values(coords_bytes, schema.dim_num())
            .expect("coords bytes length matches schema");
        values.iter().zip(range.iter()).all(|(v, &(lo, hi))| {
            let f = v.to_f64();
            f >= lo && f <= hi
        })
    })
}

fn open_fragment_sources(
    vfs: &dyn Vfs,
    array_dir: &std::path::Path,
    schema: Rc<ArraySchema>,
    gzip_suffix: &str,
) -> Result<Vec<Box<dyn CellSource>>> {
    let dirs = fragment::list_fragments(vfs, array_dir)?;
    dirs.iter()
        .enumerate()
        .map(|(i, dir)| {
            Ok(Box::new(FragmentCellSource::open(
                vfs,
                dir,
                schema.clone(),
                gzip_suffix,
                i as i64,
            )?) as Box<dyn CellSource>)
        })
        .collect()
}

/// Merges every fragment of an array into one last-write-wins, ascending
/// stream, optionally dropping cells outside a per-dimension `range` (§4.5
/// "sparse reads merge fragments with consolidation's own dedup rule").
fn consolidated_cells(
    vfs: &dyn Vfs,
    schema: Rc<ArraySchema>,
    array_dir: &std::path::Path,
    gzip_suffix: &str,
    range: Option<&[(f64, f64)]>,
) -> Result<Vec<(Vec<u8>, Vec<i64>)>> {
    let sources = open_fragment_sources(vfs, array_dir, schema.clone(), gzip_suffix)?;
    let merged = FileCollection::open(sources, schema.clone(), true)?;
    let mut consolidated = ConsolidatingCollection::open(merged);

    let mut out = Vec::new();
    while consolidated.next() {
        let coords = &consolidated.payload()[..schema.coords_size()];
        if range.map_or(true, |r| cell_in_range(&schema, coords, r)) {
            out.push((consolidated.payload().to_vec(), consolidated.ids().to_vec()));
        }
    }
    if let Some(err) = consolidated.err() {
        return Err(CommonError::new(err.kind(), err.to_string()));
    }
    Ok(out)
}

/// A forward- or reverse-ordered sparse read cursor (§4.5 "begin"/"rbegin").
/// Materializes the consolidated, filtered cell set once at open time --
/// reverse iteration needs the full set anyway to dedup correctly, so there
/// is no cheaper streaming alternative here.
pub struct SparseCursor {
    cells: Vec<(Vec<u8>, Vec<i64>)>,
    pos: usize,
}

impl SparseCursor {
    pub fn next(&mut self) -> bool {
        if self.pos >= self.cells.len() {
            return false;
        }
        self.pos += 1;
        true
    }

    pub fn payload(&self) -> &[u8] {
        &self.cells[self.pos - 1].0
    }

    pub fn ids(&self) -> &[i64] {
        &self.cells[self.pos - 1].1
    }
}

pub fn begin(
    vfs: &dyn Vfs,
    table: &DescriptorTable,
    ad: usize,
    gzip_suffix: &str,
    range: Option<Vec<(f64, f64)>>,
) -> Result<SparseCursor> {
    let state = table.get(ad)?;
    require_read_mode(state.mode)?;
    let cells = consolidated_cells(
        vfs,
        state.schema.clone(),
        &state.array_dir,
        gzip_suffix,
        range.as_deref(),
    )?;
    Ok(SparseCursor { cells, pos: 0 })
}

pub fn rbegin(
    vfs: &dyn Vfs,
    table: &DescriptorTable,
    ad: usize,
    gzip_suffix: &str,
    range: Option<Vec<(f64, f64)>>,
) -> Result<SparseCursor> {
    let state = table.get(ad)?;
    require_read_mode(state.mode)?;
    let mut cells = consolidated_cells(
        vfs,
        state.schema.clone(),
        &state.array_dir,
        gzip_suffix,
        range.as_deref(),
    )?;
    cells.reverse();
    Ok(SparseCursor { cells, pos: 0 })
}

/// Explicit rejection for reverse dense iteration (§4.5 "reverse dense
/// iteration is unsupported"; §8 failure semantics).
pub fn rbegin_dense(
    _vfs: &dyn Vfs,
    _table: &DescriptorTable,
    _ad: usize,
    _range: Option<Vec<(f64, f64)>>,
) -> Result<DenseCursor> {
    Err(StorageError::ReverseDenseUnsupported.into())
}

fn synthesize_null_cell(schema: &ArraySchema, coords_bytes: &[u8]) -> Vec<u8> {
    let mut attrs_bytes = Vec::new();
    for attr in schema.attributes() {
        let sentinel = tiledb_cell::null_sentinel_bytes(attr.cell_type);
        if attr.is_var_sized() {
            attrs_bytes.extend_from_slice(&1i32.to_ne_bytes());
            attrs_bytes.extend_from_slice(&sentinel);
        } else {
            let val_num = attr
                .val_num
                .fixed()
                .expect("fixed attribute has a fixed val_num")
                .get() as usize;
            for _ in 0..val_num {
                attrs_bytes.extend_from_slice(&sentinel);
            }
        }
    }

    let mut out = Vec::with_capacity(coords_bytes.len() + attrs_bytes.len() + 8);
    out.extend_from_slice(coords_bytes);
    if schema.attributes().iter().any(|a| a.is_var_sized()) {
        out.extend_from_slice(&attrs_bytes.len().to_ne_bytes());
    }
    out.extend_from_slice(&attrs_bytes);
    out
}

/// A forward dense read cursor: steps every coordinate of the (optionally
/// range-restricted) domain in the schema's nesting order, emitting a
/// stored cell where one exists and a NULL-filled synthesized cell
/// elsewhere (§4.5 "dense reads are total over the domain"). Hilbert order
/// has no dense nesting convention of its own in the source this was
/// distilled from, so it falls back to row-major nesting here.
pub struct DenseCursor {
    schema: Rc<ArraySchema>,
    bounds: Vec<(i64, i64)>,
    row_major: bool,
    next_coords: Option<Vec<i64>>,
    stored: HashMap<Vec<u8>, Vec<u8>>,
    current_payload: Vec<u8>,
}

impl DenseCursor {
    fn advance_counter(&self, coords: &[i64]) -> Option<Vec<i64>> {
        let mut next = coords.to_vec();
        let order: Box<dyn Iterator<Item = usize>> = if self.row_major {
            Box::new((0..next.len()).rev())
        } else {
            Box::new(0..next.len())
        };
        for d in order {
            if next[d] < self.bounds[d].1 {
                next[d] += 1;
                return Some(next);
            }
            next[d] = self.bounds[d].0;
        }
        None
    }

    pub fn next(&mut self) -> Result<bool> {
        let coords = match self.next_coords.take() {
            Some(c) => c,
            None => return Ok(false),
        };
        self.next_coords = self.advance_counter(&coords);

        let schema = self.schema.clone();
        let coords_bytes = integral_coords_type_go!(
            &schema,
            T,
            {
                let values: Vec<T> = coords.iter().map(|&v| T::from_i64(v)).collect();
                let mut out = Vec::new();
                tiledb_cell::write_values(&values, &mut out);
                out
            },
            unreachable!("dense iteration requires an integral coords_type, checked at open")
        );

        self.current_payload = match self.stored.get(&coords_bytes) {
            Some(payload) => payload.clone(),
            None => synthesize_null_cell(&schema, &coords_bytes),
        };
        Ok(true)
    }

    pub fn payload(&self) -> &[u8] {
        &self.current_payload
    }
}

pub fn begin_dense(
    vfs: &dyn Vfs,
    table: &DescriptorTable,
    ad: usize,
    gzip_suffix: &str,
    range: Option<Vec<(f64, f64)>>,
) -> Result<DenseCursor> {
    let state = table.get(ad)?;
    require_read_mode(state.mode)?;
    let schema = state.schema.clone();

    if !schema.coords_type().is_integral() {
        return Err(StorageError::WrongType.into());
    }

    let bounds: Vec<(i64, i64)> = schema
        .dimensions()
        .iter()
        .enumerate()
        .map(|(i, dim)| match &range {
            Some(r) => (
                r[i].0.max(dim.domain.0) as i64,
                r[i].1.min(dim.domain.1) as i64,
            ),
            None => (dim.domain.0 as i64, dim.domain.1 as i64),
        })
        .collect();

    let cells = consolidated_cells(vfs, schema.clone(), &state.array_dir, gzip_suffix, None)?;
    let mut stored = HashMap::with_capacity(cells.len());
    for (payload, _ids) in cells {
        let coords = payload[..schema.coords_size()].to_vec();
        stored.insert(coords, payload);
    }

    let row_major = !matches!(schema.cell_order(), CellOrder::ColMajor);
    let next_coords = if bounds.iter().any(|(lo, hi)| lo > hi) {
        None
    } else {
        Some(bounds.iter().map(|&(lo, _)| lo).collect())
    };

    Ok(DenseCursor {
        schema,
        bounds,
        row_major,
        next_coords,
        stored,
        current_payload: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::descriptor::DescriptorTable;
    use crate::fragment;
    use crate::vfs::LocalVfs;
    use crate::write::{cell_write, flush};
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn payload(coord: i32, value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&coord.to_ne_bytes());
        out.extend_from_slice(&value.to_ne_bytes());
        out
    }

    fn make_array(dir: &std::path::Path) {
        let schema = ArraySchema::new(
            "a",
            vec![AttributeData::new("v", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 9.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            10,
            4,
            vec![Compression::None, Compression::None],
        )
        .unwrap();
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(fragment::SCHEMA_FILE), schema.to_bytes()).unwrap();
    }

    #[test]
    fn sparse_begin_and_rbegin_see_the_same_cells_in_opposite_order() {
        let tmp = tempfile::tempdir().unwrap();
        make_array(&tmp.path().join("g").join("arr"));
        let vfs = LocalVfs;
        let config = Config::default();

        let mut write_table = DescriptorTable::default();
        let wad = write_table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Write,
            )
            .unwrap();
        for (coord, value) in [(3, 30), (1, 10), (2, 20)] {
            cell_write(
                &mut write_table,
                config.write_state_max_size(),
                wad,
                CoordsType::Int32,
                payload(coord, value),
            )
            .unwrap();
        }
        flush(&vfs, ".gz", &mut write_table, wad).unwrap();

        let mut read_table = DescriptorTable::default();
        let rad = read_table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Read,
            )
            .unwrap();

        let mut forward = begin(&vfs, &read_table, rad, ".gz", None).unwrap();
        let mut fwd_coords = Vec::new();
        while forward.next() {
            fwd_coords.push(i32::from_ne_bytes(forward.payload()[0..4].try_into().unwrap()));
        }
        assert_eq!(fwd_coords, vec![1, 2, 3]);

        let mut backward = rbegin(&vfs, &read_table, rad, ".gz", None).unwrap();
        let mut rev_coords = Vec::new();
        while backward.next() {
            rev_coords.push(i32::from_ne_bytes(backward.payload()[0..4].try_into().unwrap()));
        }
        assert_eq!(rev_coords, vec![3, 2, 1]);
    }

    #[test]
    fn dense_read_fills_gaps_with_null_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        make_array(&tmp.path().join("g").join("arr"));
        let vfs = LocalVfs;
        let config = Config::default();

        let mut write_table = DescriptorTable::default();
        let wad = write_table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Write,
            )
            .unwrap();
        cell_write(
            &mut write_table,
            config.write_state_max_size(),
            wad,
            CoordsType::Int32,
            payload(1, 111),
        )
        .unwrap();
        flush(&vfs, ".gz", &mut write_table, wad).unwrap();

        let mut read_table = DescriptorTable::default();
        let rad = read_table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Read,
            )
            .unwrap();

        let mut dense = begin_dense(&vfs, &read_table, rad, ".gz", Some(vec![(0.0, 2.0)])).unwrap();
        let mut out = Vec::new();
        while dense.next().unwrap() {
            let coord = i32::from_ne_bytes(dense.payload()[0..4].try_into().unwrap());
            let value = i32::from_ne_bytes(dense.payload()[4..8].try_into().unwrap());
            out.push((coord, value));
        }
        assert_eq!(out, vec![(0, i32::MAX), (1, 111), (2, i32::MAX)]);

        let err = rbegin_dense(&vfs, &read_table, rad, None).unwrap_err();
        assert_eq!(err.kind(), tiledb_common::ErrorKind::State);
    }
}
