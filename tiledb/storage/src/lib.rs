pub mod compressor;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fragment;
pub mod fragment_io;
pub mod read;
pub mod vfs;
pub mod write;

use std::path::PathBuf;
use std::sync::Mutex;

use tiledb_common::datatype::CoordsType;
use tiledb_common::Result;
use tiledb_schema::ArraySchema;

pub use compressor::{Compressor, GzipCompressor, NoneCompressor};
pub use config::{Config, ConfigBuilder};
pub use descriptor::OpenMode;
pub use error::StorageError;
pub use fragment::{FragmentTree, TileBookkeeping};
pub use read::{DenseCursor, SparseCursor};
pub use vfs::{LocalVfs, Vfs};

use descriptor::DescriptorTable;

/// The single entry point into the storage layer (§5 "the concurrency model
/// is one mutex, held for the duration of each call, living in the engine
/// rather than scattered across per-array locks"). Every public method
/// locks `table` for its own duration and releases it before returning.
pub struct Engine {
    workspace: PathBuf,
    vfs: Box<dyn Vfs>,
    config: Config,
    table: Mutex<DescriptorTable>,
}

impl Engine {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Engine::with_config(workspace, Config::default())
    }

    pub fn with_config(workspace: impl Into<PathBuf>, config: Config) -> Self {
        Engine {
            workspace: workspace.into(),
            vfs: Box::new(LocalVfs),
            config,
            table: Mutex::new(DescriptorTable::default()),
        }
    }

    /// Test/embedding hook: swap in a non-`LocalVfs` implementation.
    pub fn with_vfs(workspace: impl Into<PathBuf>, config: Config, vfs: Box<dyn Vfs>) -> Self {
        Engine {
            workspace: workspace.into(),
            vfs,
            config,
            table: Mutex::new(DescriptorTable::default()),
        }
    }

    /// Persists a fresh array schema under `group/array_name` (§4.5
    /// "workspace layout"), so a later `open` in write mode can create
    /// fragments against it.
    pub fn create_array(&self, group: &str, array_name: &str, schema: &ArraySchema) -> Result<()> {
        let group_dir = vfs::resolve_group_path(&self.workspace, group);
        let array_dir = fragment::array_dir(&group_dir, array_name);
        self.vfs.create_dir_all(&array_dir)?;
        self.vfs
            .write(&array_dir.join(fragment::SCHEMA_FILE), &schema.to_bytes())?;
        log::info!("created array {array_name:?} in group {group:?}");
        Ok(())
    }

    pub fn open(&self, group: &str, array_name: &str, mode: OpenMode) -> Result<usize> {
        let mut table = self.table.lock().expect("descriptor table mutex poisoned");
        let ad = table.open(
            self.vfs.as_ref(),
            self.config.max_open_arrays(),
            &self.workspace,
            group,
            array_name,
            mode,
        )?;
        log::debug!("opened array {array_name:?} in group {group:?} as descriptor {ad}");
        Ok(ad)
    }

    /// Idempotent: closing an already-closed or never-open descriptor
    /// succeeds silently (§4.5). Flushes any pending write buffer before
    /// releasing the slot, so cells buffered by `cell_write`/
    /// `cell_write_sorted` but never explicitly flushed aren't lost.
    pub fn close(&self, ad: usize) -> Result<()> {
        let mut table = self.table.lock().expect("descriptor table mutex poisoned");
        let needs_flush = table
            .get(ad)
            .map(|state| state.mode == OpenMode::Write)
            .unwrap_or(false);
        if needs_flush {
            write::flush(self.vfs.as_ref(), self.config.gzip_suffix(), &mut table, ad)?;
        }
        if table.take(ad).is_some() {
            log::debug!("closed descriptor {ad}");
        }
        Ok(())
    }

    pub fn cell_write(&self, ad: usize, coords_type: CoordsType, payload: Vec<u8>) -> Result<()> {
        let mut table = self.table.lock().expect("descriptor table mutex poisoned");
        write::cell_write(
            &mut table,
            self.config.write_state_max_size(),
            ad,
            coords_type,
            payload,
        )
    }

    pub fn cell_write_sorted(
        &self,
        ad: usize,
        coords_type: CoordsType,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut table = self.table.lock().expect("descriptor table mutex poisoned");
        write::cell_write_sorted(
            &mut table,
            self.config.write_state_max_size(),
            ad,
            coords_type,
            payload,
        )
    }

    pub fn flush(&self, ad: usize) -> Result<()> {
        let mut table = self.table.lock().expect("descriptor table mutex poisoned");
        write::flush(self.vfs.as_ref(), self.config.gzip_suffix(), &mut table, ad)
    }

    pub fn begin(&self, ad: usize, range: Option<Vec<(f64, f64)>>) -> Result<SparseCursor> {
        let table = self.table.lock().expect("descriptor table mutex poisoned");
        read::begin(self.vfs.as_ref(), &table, ad, self.config.gzip_suffix(), range)
    }

    pub fn rbegin(&self, ad: usize, range: Option<Vec<(f64, f64)>>) -> Result<SparseCursor> {
        let table = self.table.lock().expect("descriptor table mutex poisoned");
        read::rbegin(self.vfs.as_ref(), &table, ad, self.config.gzip_suffix(), range)
    }

    pub fn begin_dense(&self, ad: usize, range: Option<Vec<(f64, f64)>>) -> Result<DenseCursor> {
        let table = self.table.lock().expect("descriptor table mutex poisoned");
        read::begin_dense(self.vfs.as_ref(), &table, ad, self.config.gzip_suffix(), range)
    }

    pub fn rbegin_dense(&self, ad: usize, range: Option<Vec<(f64, f64)>>) -> Result<DenseCursor> {
        let table = self.table.lock().expect("descriptor table mutex poisoned");
        read::rbegin_dense(self.vfs.as_ref(), &table, ad, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::CellType;
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn schema() -> ArraySchema {
        ArraySchema::new(
            "a",
            vec![AttributeData::new("v", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 99.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            vec![Compression::None, Compression::None],
        )
        .unwrap()
    }

    #[test]
    fn end_to_end_write_flush_read_round_trips_a_cell() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::new(tmp.path());
        engine.create_array("g", "arr", &schema()).unwrap();

        let wad = engine.open("g", "arr", OpenMode::Write).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i32.to_ne_bytes());
        payload.extend_from_slice(&42i32.to_ne_bytes());
        engine
            .cell_write(wad, CoordsType::Int32, payload)
            .unwrap();
        engine.flush(wad).unwrap();
        engine.close(wad).unwrap();

        let rad = engine.open("g", "arr", OpenMode::Read).unwrap();
        let mut cursor = engine.begin(rad, None).unwrap();
        assert!(cursor.next());
        let coord = i32::from_ne_bytes(cursor.payload()[0..4].try_into().unwrap());
        let value = i32::from_ne_bytes(cursor.payload()[4..8].try_into().unwrap());
        assert_eq!((coord, value), (7, 42));
        assert!(!cursor.next());
    }

    #[test]
    fn too_many_open_arrays_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::builder().max_open_arrays(1).build();
        let engine = Engine::with_config(tmp.path(), config);
        engine.create_array("g", "a1", &schema()).unwrap();
        engine.create_array("g", "a2", &schema()).unwrap();

        let _first = engine.open("g", "a1", OpenMode::Read).unwrap();
        let err = engine.open("g", "a2", OpenMode::Read).unwrap_err();
        assert_eq!(err.kind(), tiledb_common::ErrorKind::State);
    }

    #[test]
    fn close_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::new(tmp.path());
        engine.create_array("g", "arr", &schema()).unwrap();
        let ad = engine.open("g", "arr", OpenMode::Read).unwrap();
        engine.close(ad).unwrap();
        engine.close(ad).unwrap();
    }
}
