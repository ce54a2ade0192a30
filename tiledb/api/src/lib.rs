//! Public facade over the storage engine crates. A host embeds the engine
//! by depending on this crate alone; `tiledb-common`/`tiledb-schema`/
//! `tiledb-cell`/`tiledb-collection`/`tiledb-storage` are implementation
//! details it should not need to name directly.

pub use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
pub use tiledb_common::datatype::{CellType, CoordsType};
pub use tiledb_common::key::LookupKey;
pub use tiledb_common::{Error, ErrorKind};

pub use tiledb_schema::{AttributeData, ArraySchema, DimensionData};

pub use tiledb_cell::{default_attribute_ids, Cell};

pub use tiledb_storage::{
    Config, ConfigBuilder, DenseCursor, Engine, FragmentTree, OpenMode, SparseCursor,
    StorageError, TileBookkeeping,
};

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ArraySchema {
        ArraySchema::new(
            "quickstart",
            vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 9.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            10,
            4,
            vec![Compression::None, Compression::None],
        )
        .unwrap()
    }

    /// Smoke test that a host can drive the whole write/flush/read cycle
    /// through nothing but this crate's re-exports.
    #[test]
    fn quickstart_sparse_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::new(tmp.path());
        engine.create_array("g", "arr", &schema()).unwrap();

        let wad = engine.open("g", "arr", OpenMode::Write).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(&3i32.to_ne_bytes());
        payload.extend_from_slice(&99i32.to_ne_bytes());
        engine.cell_write(wad, CoordsType::Int32, payload).unwrap();
        engine.flush(wad).unwrap();
        engine.close(wad).unwrap();

        let rad = engine.open("g", "arr", OpenMode::Read).unwrap();
        let mut cursor = engine.begin(rad, None).unwrap();
        assert!(cursor.next());
        let coord = i32::from_ne_bytes(cursor.payload()[0..4].try_into().unwrap());
        assert_eq!(coord, 3);
        assert!(!cursor.next());
    }
}
