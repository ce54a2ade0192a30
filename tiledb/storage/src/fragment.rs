use std::path::{Path, PathBuf};

use tiledb_common::{Error as CommonError, Result};
use tiledb_schema::ArraySchema;

use crate::error::StorageError;
use crate::vfs::Vfs;

pub const BOUNDING_COORDINATES_FILE: &str = "bounding_coordinates.bkp";
pub const MBRS_FILE: &str = "mbrs.bkp";
pub const OFFSETS_FILE: &str = "offsets.bkp";
pub const TILE_IDS_FILE: &str = "tile_ids.bkp";
pub const FRAGMENT_TREE_FILE: &str = "fragment_tree.bkp";
pub const SCHEMA_FILE: &str = "array_schema";

/// A strictly-increasing fragment name (§4.5 "allocate a fresh fragment
/// name (strictly increasing lexicographically)"). Zero-padded so
/// lexicographic and numeric order agree up to `u64::MAX`.
pub fn fragment_name(sequence: u64) -> String {
    format!("fragment_{sequence:020}")
}

struct Writer(Vec<u8>);

impl Writer {
    fn new() -> Self {
        Writer(Vec::new())
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_ne_bytes());
    }

    fn u64_vec(&mut self, values: &[u64]) {
        self.u32(values.len() as u32);
        for &v in values {
            self.u64(v);
        }
    }

    fn f64_vec(&mut self, values: &[f64]) {
        self.u32(values.len() as u32);
        for &v in values {
            self.f64(v);
        }
    }

    fn string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.u32(bytes.len() as u32);
        self.0.extend_from_slice(bytes);
    }

    fn string_vec(&mut self, values: &[String]) {
        self.u32(values.len() as u32);
        for v in values {
            self.string(v);
        }
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
            return Err(CommonError::codec("fragment bookkeeping buffer truncated"));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u64_vec(&mut self) -> Result<Vec<u64>> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.u64()).collect()
    }

    fn f64_vec(&mut self) -> Result<Vec<f64>> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.f64()).collect()
    }

    fn string(&mut self) -> Result<String> {
        let n = self.u32()? as usize;
        String::from_utf8(self.take(n)?.to_vec())
            .map_err(|_| CommonError::codec("fragment bookkeeping buffer has invalid utf8"))
    }

    fn string_vec(&mut self) -> Result<Vec<String>> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.string()).collect()
    }
}

/// `(level, fragment_count)` bookkeeping (§4.5 "list of (level,
/// fragment_count) pairs"), indexed by level. Carries each level's actual
/// fragment directory names (not just a count) so the consolidation cascade
/// knows which directories to merge; `count_at` is the derived view §4.5
/// describes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FragmentTree {
    pub levels: Vec<Vec<String>>,
}

impl FragmentTree {
    pub fn count_at(&self, level: usize) -> usize {
        self.levels.get(level).map(|v| v.len()).unwrap_or(0)
    }

    pub fn push(&mut self, level: usize, name: String) {
        while self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        self.levels[level].push(name);
    }

    /// Removes and returns a level's fragment names, oldest first.
    pub fn take_level(&mut self, level: usize) -> Vec<String> {
        if level < self.levels.len() {
            std::mem::take(&mut self.levels[level])
        } else {
            Vec::new()
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(self.levels.len() as u32);
        for names in &self.levels {
            w.string_vec(names);
        }
        w.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let n = r.u32()? as usize;
        let mut levels = Vec::with_capacity(n);
        for _ in 0..n {
            levels.push(r.string_vec()?);
        }
        Ok(FragmentTree { levels })
    }
}

/// Per-fragment tile bookkeeping: sequential tile ids, each tile's byte
/// offset into the coordinate/attribute data files, its first/last
/// coordinate, and its axis-aligned bounding box. Tiles here are
/// `capacity`-sized runs of the flush's sorted cell sequence -- this
/// keeps write-path bookkeeping independent of the `tile_id` geometry
/// `tiledb-schema::geometry` already computes for query planning, which
/// only applies to schemas with regular tiles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileBookkeeping {
    pub tile_ids: Vec<u64>,
    pub offsets: Vec<u64>,
    pub bounding_coordinates: Vec<f64>,
    pub mbrs: Vec<f64>,
}

impl TileBookkeeping {
    pub fn write(&self, vfs: &dyn Vfs, dir: &Path) -> Result<()> {
        let mut w = Writer::new();
        w.u64_vec(&self.tile_ids);
        vfs.write(&dir.join(TILE_IDS_FILE), &w.0)?;

        let mut w = Writer::new();
        w.u64_vec(&self.offsets);
        vfs.write(&dir.join(OFFSETS_FILE), &w.0)?;

        let mut w = Writer::new();
        w.f64_vec(&self.bounding_coordinates);
        vfs.write(&dir.join(BOUNDING_COORDINATES_FILE), &w.0)?;

        let mut w = Writer::new();
        w.f64_vec(&self.mbrs);
        vfs.write(&dir.join(MBRS_FILE), &w.0)?;

        Ok(())
    }

    pub fn read(vfs: &dyn Vfs, dir: &Path) -> Result<Self> {
        let tile_ids = Reader::new(&vfs.read(&dir.join(TILE_IDS_FILE))?).u64_vec()?;
        let offsets = Reader::new(&vfs.read(&dir.join(OFFSETS_FILE))?).u64_vec()?;
        let bounding_coordinates =
            Reader::new(&vfs.read(&dir.join(BOUNDING_COORDINATES_FILE))?).f64_vec()?;
        let mbrs = Reader::new(&vfs.read(&dir.join(MBRS_FILE))?).f64_vec()?;
        Ok(TileBookkeeping {
            tile_ids,
            offsets,
            bounding_coordinates,
            mbrs,
        })
    }
}

/// `<attr_id>.tdt` file name, coords using `schema.attribute_num()` as
/// the pseudo attribute id (matches `tiledb_cell::cell::coords_attr_id`).
pub fn tdt_file_name(attr_id: usize) -> String {
    format!("{attr_id}.tdt")
}

pub fn array_dir(workspace_group_dir: &Path, array_name: &str) -> PathBuf {
    workspace_group_dir.join(array_name)
}

/// A fragment directory is well-formed if its `tile_ids.bkp` is present
/// (§4.5 "a flush failure leaves the fragment directory half-written ...
/// the resolver ignores fragments whose `tile_ids` is missing").
pub fn is_fragment_complete(vfs: &dyn Vfs, fragment_dir: &Path) -> bool {
    vfs.exists(&fragment_dir.join(TILE_IDS_FILE))
}

/// Lists complete fragment directories under an array directory, in
/// fragment-name order (which is also write order, since names are
/// strictly increasing).
pub fn list_fragments(vfs: &dyn Vfs, array_dir: &Path) -> Result<Vec<PathBuf>> {
    if !vfs.exists(array_dir) {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = vfs
        .list_dir(array_dir)?
        .into_iter()
        .filter(|p| p.is_dir() && is_fragment_complete(vfs, p))
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub fn load_schema(vfs: &dyn Vfs, array_dir: &Path) -> Result<ArraySchema> {
    let path = array_dir.join(SCHEMA_FILE);
    if !vfs.exists(&path) {
        return Err(StorageError::SchemaMissing(path.display().to_string()).into());
    }
    let bytes = vfs.read(&path)?;
    ArraySchema::from_bytes(&bytes)
        .map_err(|e| StorageError::SchemaCorrupt(path.display().to_string(), e.to_string()).into())
}
