use std::rc::Rc;

use tiledb_schema::ArraySchema;

use crate::collection::FileCollection;

/// Collapses a sorted [FileCollection] of fragment streams (stamped with
/// `id_num = 2`: fragment index, then in-fragment sequence) into one cell
/// per distinct coordinate, keeping the cell from the highest fragment
/// index among coordinate-equal duplicates (§4.4 "last write wins").
///
/// Tombstones are not special-cased here: whichever cell wins by fragment
/// index is emitted as-is, so a tombstone that happens to win still comes
/// out the other end. Full cross-generation tombstone elision (dropping a
/// delete once every fragment it could shadow has itself been merged away)
/// is out of scope; this collection only ever resolves one consolidation
/// step at a time.
pub struct ConsolidatingCollection {
    inner: FileCollection,
    schema: Rc<ArraySchema>,
    pending: Option<(Vec<u8>, Vec<i64>)>,
    current_payload: Vec<u8>,
    current_ids: Vec<i64>,
}

impl ConsolidatingCollection {
    pub fn open(inner: FileCollection) -> Self {
        let schema = inner.schema().clone();
        ConsolidatingCollection {
            inner,
            schema,
            pending: None,
            current_payload: Vec::new(),
            current_ids: Vec::new(),
        }
    }

    pub fn next(&mut self) -> bool {
        let (mut best_payload, mut best_ids) = match self.pending.take() {
            Some(entry) => entry,
            None => {
                if self.inner.next() {
                    (self.inner.payload().to_vec(), self.inner.ids().to_vec())
                } else {
                    return false;
                }
            }
        };

        let coord_size = self.schema.coords_size();
        loop {
            if !self.inner.next() {
                break;
            }
            let next_payload = self.inner.payload().to_vec();
            let next_ids = self.inner.ids().to_vec();

            if next_payload[..coord_size] == best_payload[..coord_size] {
                let best_fragment = best_ids.first().copied().unwrap_or(0);
                let next_fragment = next_ids.first().copied().unwrap_or(0);
                if next_fragment >= best_fragment {
                    best_payload = next_payload;
                    best_ids = next_ids;
                }
            } else {
                self.pending = Some((next_payload, next_ids));
                break;
            }
        }

        self.current_payload = best_payload;
        self.current_ids = best_ids;
        true
    }

    pub fn payload(&self) -> &[u8] {
        &self.current_payload
    }

    pub fn ids(&self) -> &[i64] {
        &self.current_ids
    }

    pub fn err(&self) -> Option<&tiledb_common::Error> {
        self.inner.err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{BinCellReader, CellSource};
    use std::io::Cursor;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn schema() -> Rc<ArraySchema> {
        Rc::new(
            ArraySchema::new(
                "consolidate",
                vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
                vec![DimensionData::new("x", 0.0, 99.0)],
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

    fn fragment(fragment_id: i64, cells: &[(i32, i32)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(coord, value) in cells {
            out.extend_from_slice(&fragment_id.to_ne_bytes());
            out.extend_from_slice(&0i64.to_ne_bytes());
            out.extend_from_slice(&coord.to_ne_bytes());
            out.extend_from_slice(&value.to_ne_bytes());
        }
        out
    }

    #[test]
    fn higher_fragment_index_wins_on_duplicate_coordinates() {
        let schema = schema();
        let old: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(fragment(1, &[(5, 100), (9, 900)])),
            schema.clone(),
            2,
        ));
        let new: Box<dyn CellSource> = Box::new(BinCellReader::new(
            Cursor::new(fragment(2, &[(5, 200)])),
            schema.clone(),
            2,
        ));

        let merged = FileCollection::open(vec![old, new], schema, true).unwrap();
        let mut consolidated = ConsolidatingCollection::open(merged);

        let mut out = Vec::new();
        while consolidated.next() {
            let coord = i32::from_ne_bytes(consolidated.payload()[0..4].try_into().unwrap());
            let value = i32::from_ne_bytes(consolidated.payload()[4..8].try_into().unwrap());
            out.push((coord, value));
        }
        assert_eq!(out, vec![(5, 200), (9, 900)]);
    }
}
