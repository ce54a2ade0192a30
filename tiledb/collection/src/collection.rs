use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use tiledb_common::Result;
use tiledb_schema::{coords_type_go, ArraySchema};

use crate::reader::CellSource;

/// One pending cell in a sorted [FileCollection]'s merge heap: the file it
/// came from, its raw payload/ids (copied out so several peeks can be held
/// live at once), and a shared schema to decode/compare coordinates with.
///
/// `Ord` can't be derived since cell ordering is schema-dependent at
/// runtime (§4.1's `precedes`/`succeeds`, not a static type-level `Ord`);
/// this wraps that comparator so `BinaryHeap` can use it directly.
pub struct HeapEntry {
    pub file_index: usize,
    pub payload: Vec<u8>,
    pub ids: Vec<i64>,
    schema: Rc<ArraySchema>,
}

impl HeapEntry {
    fn coords_bytes(&self) -> &[u8] {
        &self.payload[..self.schema.coords_size()]
    }

    fn cmp_coords(&self, other: &Self) -> Ordering {
        let schema = &self.schema;
        let a_bytes = self.coords_bytes();
        let b_bytes = other.coords_bytes();
        coords_type_go!(schema, T, {
            let a: Vec<T> = tiledb_cell::read_values(a_bytes, schema.dim_num())
                .expect("peeked cell coords length matches schema");
            let b: Vec<T> = tiledb_cell::read_values(b_bytes, schema.dim_num())
                .expect("peeked cell coords length matches schema");
            if tiledb_schema::geometry::precedes(schema, &a, &b) {
                Ordering::Less
            } else if tiledb_schema::geometry::succeeds(schema, &a, &b) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_coords(other).then_with(|| self.file_index.cmp(&other.file_index))
    }
}

/// Merges several [CellSource]s into one ordered cell stream (§4.4).
///
/// `sorted = false` concatenates sources in file order, scanning circularly
/// from the last file a cell was drawn from so input order between files is
/// undisturbed. `sorted = true` runs a min-heap merge keyed on
/// `precedes`/`succeeds`, giving `O(log k)` per cell across `k` sources.
pub struct FileCollection {
    sources: Vec<Box<dyn CellSource>>,
    schema: Rc<ArraySchema>,
    sorted: bool,
    live: Vec<bool>,
    last_file: usize,
    queue: BinaryHeap<Reverse<HeapEntry>>,
    current_payload: Vec<u8>,
    current_ids: Vec<i64>,
    err: Option<tiledb_common::Error>,
}

impl FileCollection {
    pub fn open(
        sources: Vec<Box<dyn CellSource>>,
        schema: Rc<ArraySchema>,
        sorted: bool,
    ) -> Result<Self> {
        let mut collection = FileCollection {
            live: vec![false; sources.len()],
            sources,
            schema,
            sorted,
            last_file: 0,
            queue: BinaryHeap::new(),
            current_payload: Vec::new(),
            current_ids: Vec::new(),
            err: None,
        };
        collection.prime()?;
        Ok(collection)
    }

    fn prime(&mut self) -> Result<()> {
        for i in 0..self.sources.len() {
            if self.sources[i].advance()? {
                self.live[i] = true;
                if self.sorted {
                    self.queue.push(Reverse(HeapEntry {
                        file_index: i,
                        payload: self.sources[i].payload().to_vec(),
                        ids: self.sources[i].ids().to_vec(),
                        schema: self.schema.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// Advances to the next merged cell. Returns `false` both on clean
    /// exhaustion and on a read error -- check [FileCollection::err] to
    /// distinguish the two, matching the crate-wide "iterators set an
    /// internal error flag" convention.
    pub fn next(&mut self) -> bool {
        match self.try_next() {
            Ok(found) => found,
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    fn try_next(&mut self) -> Result<bool> {
        if self.sorted {
            self.try_next_sorted()
        } else {
            self.try_next_unsorted()
        }
    }

    fn try_next_sorted(&mut self) -> Result<bool> {
        let Reverse(entry) = match self.queue.pop() {
            Some(e) => e,
            None => return Ok(false),
        };
        let idx = entry.file_index;
        self.current_payload = entry.payload;
        self.current_ids = entry.ids;

        if self.sources[idx].advance()? {
            self.queue.push(Reverse(HeapEntry {
                file_index: idx,
                payload: self.sources[idx].payload().to_vec(),
                ids: self.sources[idx].ids().to_vec(),
                schema: self.schema.clone(),
            }));
        } else {
            self.live[idx] = false;
        }
        Ok(true)
    }

    fn try_next_unsorted(&mut self) -> Result<bool> {
        let n = self.sources.len();
        if n == 0 {
            return Ok(false);
        }
        for k in 0..n {
            let idx = (self.last_file + k) % n;
            if self.live[idx] {
                self.current_payload = self.sources[idx].payload().to_vec();
                self.current_ids = self.sources[idx].ids().to_vec();
                self.live[idx] = self.sources[idx].advance()?;
                self.last_file = idx;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn payload(&self) -> &[u8] {
        &self.current_payload
    }

    pub fn ids(&self) -> &[i64] {
        &self.current_ids
    }

    pub fn err(&self) -> Option<&tiledb_common::Error> {
        self.err.as_ref()
    }

    pub fn schema(&self) -> &Rc<ArraySchema> {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BinCellReader;
    use std::io::Cursor;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn schema() -> Rc<ArraySchema> {
        Rc::new(
            ArraySchema::new(
                "m",
                vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
                vec![DimensionData::new("x", 0.0, 999.0)],
                CoordsType::Int32,
                CellOrder::RowMajor,
                TileOrder::None,
                Vec::new(),
                10,
                10,
                vec![Compression::None, Compression::None],
            )
            .unwrap(),
        )
    }

    fn bin_cells(coords: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        for &c in coords {
            out.extend_from_slice(&c.to_ne_bytes());
            out.extend_from_slice(&(c * 10).to_ne_bytes());
        }
        out
    }

    #[test]
    fn sorted_merge_interleaves_two_files_in_order() {
        let schema = schema();
        let file_a: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(bin_cells(&[1, 5, 9])),
            schema.clone(),
            0,
        ));
        let file_b: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(bin_cells(&[2, 4, 10])),
            schema.clone(),
            0,
        ));

        let mut merged = FileCollection::open(vec![file_a, file_b], schema, true).unwrap();
        let mut coords = Vec::new();
        while merged.next() {
            coords.push(i32::from_ne_bytes(merged.payload()[0..4].try_into().unwrap()));
        }
        assert!(merged.err().is_none());
        assert_eq!(coords, vec![1, 2, 4, 5, 9, 10]);
    }

    #[test]
    fn unsorted_concatenation_preserves_per_file_order() {
        let schema = schema();
        let file_a: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(bin_cells(&[9, 1])),
            schema.clone(),
            0,
        ));
        let file_b: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(bin_cells(&[2, 4])),
            schema.clone(),
            0,
        ));

        let mut merged = FileCollection::open(vec![file_a, file_b], schema, false).unwrap();
        let mut coords = Vec::new();
        while merged.next() {
            coords.push(i32::from_ne_bytes(merged.payload()[0..4].try_into().unwrap()));
        }
        assert_eq!(coords, vec![9, 1, 2, 4]);
    }
}
