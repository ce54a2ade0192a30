use std::rc::Rc;

use tiledb_collection::{CellSource, ConsolidatingCollection, FileCollection};
use tiledb_common::datatype::CoordsType;
use tiledb_common::{Error as CommonError, Result};
use tiledb_schema::ArraySchema;

use crate::descriptor::{ArrayState, DescriptorTable, OpenMode};
use crate::error::StorageError;
use crate::fragment::{self, FragmentTree, TileBookkeeping};
use crate::fragment_io::{self, FragmentCellSource};
use crate::vfs::Vfs;

fn require_write_mode(state: &ArrayState) -> Result<()> {
    if state.mode != OpenMode::Write {
        return Err(StorageError::InvalidMode.into());
    }
    Ok(())
}

fn require_coords_type(schema: &ArraySchema, coords_type: CoordsType) -> Result<()> {
    if schema.coords_type() != coords_type {
        return Err(StorageError::WrongType.into());
    }
    Ok(())
}

/// Buffers one cell's canonical payload for an open-for-write array, marking
/// the write buffer dirty enough that `flush` must sort it before it hits
/// disk (§4.5 "`cell_write` buffers an out-of-order cell").
pub fn cell_write(
    table: &mut DescriptorTable,
    write_state_max_size: usize,
    ad: usize,
    coords_type: CoordsType,
    payload: Vec<u8>,
) -> Result<()> {
    let state = table.get_mut(ad)?;
    require_write_mode(state)?;
    require_coords_type(&state.schema, coords_type)?;
    buffer_payload(state, write_state_max_size, payload, true)
}

/// Same as [cell_write], but the caller attests the cells are supplied in
/// already-sorted order (§4.5 "`cell_write_sorted` skips the flush-time
/// sort when every call this flush cycle used it").
pub fn cell_write_sorted(
    table: &mut DescriptorTable,
    write_state_max_size: usize,
    ad: usize,
    coords_type: CoordsType,
    payload: Vec<u8>,
) -> Result<()> {
    let state = table.get_mut(ad)?;
    require_write_mode(state)?;
    require_coords_type(&state.schema, coords_type)?;
    let needs_sort = state.write_buffer_needs_sort;
    buffer_payload(state, write_state_max_size, payload, needs_sort)
}

fn buffer_payload(
    state: &mut ArrayState,
    write_state_max_size: usize,
    payload: Vec<u8>,
    needs_sort: bool,
) -> Result<()> {
    let incoming = payload.len();
    if state.write_buffer_bytes + incoming > write_state_max_size {
        return Err(StorageError::BufferOverflow(write_state_max_size).into());
    }
    state.write_buffer_bytes += incoming;
    state.write_buffer.push(payload);
    state.write_buffer_needs_sort = needs_sort;
    Ok(())
}

/// Flushes the pending write buffer into a new fragment (§4.5 "flush at
/// 1 GiB or close"), then runs the consolidation cascade. A no-op on an
/// empty buffer.
pub fn flush(vfs: &dyn Vfs, gzip_suffix: &str, table: &mut DescriptorTable, ad: usize) -> Result<()> {
    let state = table.get_mut(ad)?;
    require_write_mode(state)?;
    if state.write_buffer.is_empty() {
        return Ok(());
    }

    let mut cells = std::mem::take(&mut state.write_buffer);
    state.write_buffer_bytes = 0;
    if state.write_buffer_needs_sort {
        sort_cells(&state.schema, &mut cells);
    }
    state.write_buffer_needs_sort = false;

    let name = fragment::fragment_name(state.next_fragment_seq);
    state.next_fragment_seq += 1;
    let fragment_dir = state.array_dir.join(&name);
    vfs.create_dir_all(&fragment_dir)?;

    let bookkeeping =
        fragment_io::write_fragment_columns(vfs, &fragment_dir, &state.schema, gzip_suffix, &cells)?;
    bookkeeping.write(vfs, &fragment_dir)?;

    state.fragment_tree.push(0, name);

    let tree_path = state.array_dir.join(fragment::FRAGMENT_TREE_FILE);
    vfs.write(&tree_path, &state.fragment_tree.to_bytes())?;

    log::debug!(
        "flushed {} cells into {} for array at {:?}",
        cells.len(),
        fragment::fragment_name(state.next_fragment_seq - 1),
        state.array_dir
    );

    cascade(vfs, gzip_suffix, state)?;

    let tree_path = state.array_dir.join(fragment::FRAGMENT_TREE_FILE);
    vfs.write(&tree_path, &state.fragment_tree.to_bytes())?;

    Ok(())
}

fn sort_cells(schema: &ArraySchema, cells: &mut [Vec<u8>]) {
    cells.sort_by(|a, b| {
        use tiledb_cell::{default_attribute_ids, Cell};
        let ids = default_attribute_ids(schema);
        let ca = Cell::new(schema, ids.clone(), a);
        let cb = Cell::new(schema, ids, b);
        if ca.precedes(&cb) {
            std::cmp::Ordering::Less
        } else if ca.succeeds(&cb) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
}

/// Whenever a level holds `consolidation_step` fragments, merges them
/// (last-write-wins on duplicate coordinates) into a single fragment one
/// level up, deletes the merged-away directories, and cascades upward
/// (§7 "Consolidation", O(log_step(N)) fragment count).
///
/// Recency within one merge batch is tracked by the batch-local position
/// (oldest = 0, newest = step - 1) rather than a global fragment sequence
/// number: every duplicate a given merge resolves always originates from
/// exactly that batch, so a local index is sufficient to rank recency.
fn cascade(vfs: &dyn Vfs, gzip_suffix: &str, state: &mut ArrayState) -> Result<()> {
    let step = (state.schema.consolidation_step() as usize).max(1);
    let mut level = 0;
    while state.fragment_tree.count_at(level) >= step {
        let merge_names = state.fragment_tree.take_level(level);
        let merged_name = merge_level(vfs, gzip_suffix, state, level, &merge_names)?;
        for name in &merge_names {
            vfs.remove_dir_all(&state.array_dir.join(name))?;
        }
        state.fragment_tree.push(level + 1, merged_name);

        log::info!(
            "consolidated {} level-{level} fragments for array at {:?}",
            merge_names.len(),
            state.array_dir
        );

        level += 1;
    }
    Ok(())
}

fn merge_level(
    vfs: &dyn Vfs,
    gzip_suffix: &str,
    state: &mut ArrayState,
    level: usize,
    names: &[String],
) -> Result<String> {
    let schema: Rc<ArraySchema> = state.schema.clone();
    let mut sources: Vec<Box<dyn CellSource>> = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let dir = state.array_dir.join(name);
        sources.push(Box::new(FragmentCellSource::open(
            vfs,
            &dir,
            schema.clone(),
            gzip_suffix,
            i as i64,
        )?));
    }

    let merged = FileCollection::open(sources, schema.clone(), true)?;
    let mut consolidated = ConsolidatingCollection::open(merged);
    let mut cells = Vec::new();
    while consolidated.next() {
        cells.push(consolidated.payload().to_vec());
    }
    if let Some(err) = consolidated.err() {
        return Err(CommonError::new(err.kind(), err.to_string()));
    }

    let new_name = fragment::fragment_name(state.next_fragment_seq);
    state.next_fragment_seq += 1;
    let new_dir = state.array_dir.join(&new_name);
    vfs.create_dir_all(&new_dir)?;
    let bookkeeping: TileBookkeeping =
        fragment_io::write_fragment_columns(vfs, &new_dir, &schema, gzip_suffix, &cells)?;
    bookkeeping.write(vfs, &new_dir)?;

    let _ = level;
    Ok(new_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::descriptor::DescriptorTable;
    use crate::vfs::LocalVfs;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::CellType;
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn payload(coord: i32, value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&coord.to_ne_bytes());
        out.extend_from_slice(&value.to_ne_bytes());
        out
    }

    fn make_array(dir: &std::path::Path, consolidation_step: u32) {
        let schema = ArraySchema::new(
            "a",
            vec![AttributeData::new("v", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 999.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            4,
            consolidation_step,
            vec![Compression::None, Compression::None],
        )
        .unwrap();
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(fragment::SCHEMA_FILE), schema.to_bytes()).unwrap();
    }

    #[test]
    fn three_single_cell_writes_cascade_as_spec_scenario_s5() {
        let tmp = tempfile::tempdir().unwrap();
        let array_dir = tmp.path().join("g").join("arr");
        make_array(&array_dir, 2);

        let vfs = LocalVfs;
        let config = Config::default();
        let mut table = DescriptorTable::default();
        let ad = table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Write,
            )
            .unwrap();

        for (coord, value) in [(1, 10), (2, 20), (3, 30)] {
            cell_write(
                &mut table,
                config.write_state_max_size(),
                ad,
                CoordsType::Int32,
                payload(coord, value),
            )
            .unwrap();
            flush(&vfs, ".gz", &mut table, ad).unwrap();
        }

        let state = table.get(ad).unwrap();
        assert_eq!(state.fragment_tree.count_at(0), 1);
        assert_eq!(state.fragment_tree.count_at(1), 1);
    }

    #[test]
    fn wrong_coords_type_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let array_dir = tmp.path().join("g").join("arr");
        make_array(&array_dir, 10);

        let vfs = LocalVfs;
        let config = Config::default();
        let mut table = DescriptorTable::default();
        let ad = table
            .open(
                &vfs,
                config.max_open_arrays(),
                tmp.path(),
                "g",
                "arr",
                OpenMode::Write,
            )
            .unwrap();

        let err = cell_write(
            &mut table,
            config.write_state_max_size(),
            ad,
            CoordsType::Int64,
            payload(1, 1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), tiledb_common::ErrorKind::InvalidArgument);
    }

    #[test]
    fn buffer_overflow_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let array_dir = tmp.path().join("g").join("arr");
        make_array(&array_dir, 10);

        let vfs = LocalVfs;
        let mut table = DescriptorTable::default();
        let ad = table
            .open(&vfs, 100, tmp.path(), "g", "arr", OpenMode::Write)
            .unwrap();

        let err = cell_write(&mut table, 4, ad, CoordsType::Int32, payload(1, 1)).unwrap_err();
        assert_eq!(err.kind(), tiledb_common::ErrorKind::State);
    }
}
