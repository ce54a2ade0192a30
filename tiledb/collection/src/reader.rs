use std::io::{BufRead, Read};
use std::rc::Rc;

use tiledb_common::{Error, Result};
use tiledb_schema::ArraySchema;

/// One input stream a [crate::FileCollection] merges over: a pull-based
/// cursor with exactly one pending cell at a time (§4.4 `peek[]`).
///
/// `advance` reads the next cell into the source's own reusable buffer;
/// `payload`/`ids` borrow that buffer until the following `advance` call,
/// mirroring `Cell::set_payload`'s reuse contract in `tiledb-cell`.
pub trait CellSource {
    fn advance(&mut self) -> Result<bool>;
    fn payload(&self) -> &[u8];
    fn ids(&self) -> &[i64];
}

/// The ~10 MiB I/O segment from spec.md §5, realized as a `BufReader`
/// capacity rather than a hand-rolled ring buffer.
pub const IO_SEGMENT_SIZE: usize = 10 * 1024 * 1024;

/// Reads the canonical binary cell layout (§4.2) from a byte stream,
/// optionally preceded by `id_num * sizeof(i64)` consolidation ids (§4.4).
pub struct BinCellReader<R> {
    inner: R,
    schema: Rc<ArraySchema>,
    id_num: usize,
    cell_buf: Vec<u8>,
    ids_buf: Vec<i64>,
}

impl<R: Read> BinCellReader<R> {
    pub fn new(inner: R, schema: Rc<ArraySchema>, id_num: usize) -> Self {
        BinCellReader {
            inner,
            schema,
            id_num,
            cell_buf: Vec::with_capacity(4096),
            ids_buf: Vec::new(),
        }
    }

    /// Reads `buf.len()` bytes, mapping a clean EOF (zero bytes consumed
    /// so far) to `Ok(false)` instead of an error -- the one point in a
    /// record where "no more cells" is a valid outcome.
    fn read_exact_allow_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.inner.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: Read> CellSource for BinCellReader<R> {
    fn advance(&mut self) -> Result<bool> {
        self.cell_buf.clear();
        self.ids_buf.clear();

        let coords_size = self.schema.coords_size();

        if self.id_num > 0 {
            let mut idbuf = [0u8; 8];
            if !self.read_exact_allow_eof(&mut idbuf)? {
                return Ok(false);
            }
            self.ids_buf.push(i64::from_ne_bytes(idbuf));
            for _ in 1..self.id_num {
                self.inner.read_exact(&mut idbuf)?;
                self.ids_buf.push(i64::from_ne_bytes(idbuf));
            }
            let mut coords = vec![0u8; coords_size];
            self.inner.read_exact(&mut coords)?;
            self.cell_buf.extend_from_slice(&coords);
        } else {
            let mut coords = vec![0u8; coords_size];
            if !self.read_exact_allow_eof(&mut coords)? {
                return Ok(false);
            }
            self.cell_buf.extend_from_slice(&coords);
        }

        let is_var_sized = self.schema.attributes().iter().any(|a| a.is_var_sized());
        let attr_len = if is_var_sized {
            let mut lb = [0u8; std::mem::size_of::<usize>()];
            self.inner.read_exact(&mut lb)?;
            self.cell_buf.extend_from_slice(&lb);
            usize::from_ne_bytes(lb)
        } else {
            self.schema.cell_sizes().iter().map(|&s| s as usize).sum()
        };

        let mut attrs = vec![0u8; attr_len];
        self.inner.read_exact(&mut attrs)?;
        self.cell_buf.extend_from_slice(&attrs);

        Ok(true)
    }

    fn payload(&self) -> &[u8] {
        &self.cell_buf
    }

    fn ids(&self) -> &[i64] {
        &self.ids_buf
    }
}

/// Reads CSV-line cells (§4.3), one per input line, in a user-supplied
/// `(dim_ids, attribute_ids)` field order. Carries no consolidation ids --
/// §4.4 only stamps those onto `BINFileCollection` streams.
pub struct CsvCellReader<R> {
    inner: R,
    schema: Rc<ArraySchema>,
    attribute_ids: Vec<usize>,
    dim_ids: Vec<usize>,
    delimiter: char,
    cell_buf: Vec<u8>,
    line_buf: String,
}

impl<R: BufRead> CsvCellReader<R> {
    pub fn new(
        inner: R,
        schema: Rc<ArraySchema>,
        attribute_ids: Vec<usize>,
        dim_ids: Vec<usize>,
        delimiter: char,
    ) -> Self {
        CsvCellReader {
            inner,
            schema,
            attribute_ids,
            dim_ids,
            delimiter,
            cell_buf: Vec::with_capacity(4096),
            line_buf: String::new(),
        }
    }
}

impl<R: BufRead> CellSource for CsvCellReader<R> {
    fn advance(&mut self) -> Result<bool> {
        self.line_buf.clear();
        let n = self.inner.read_line(&mut self.line_buf).map_err(Error::from)?;
        if n == 0 {
            return Ok(false);
        }
        let line = self.line_buf.trim_end_matches(['\n', '\r']);
        self.cell_buf = tiledb_cell::csv::csv_line_to_cell_bytes(
            &self.schema,
            &self.attribute_ids,
            &self.dim_ids,
            line,
            self.delimiter,
        )?;
        Ok(true)
    }

    fn payload(&self) -> &[u8] {
        &self.cell_buf
    }

    fn ids(&self) -> &[i64] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn schema() -> Rc<ArraySchema> {
        Rc::new(
            ArraySchema::new(
                "r",
                vec![AttributeData::new(
                    "a",
                    CellType::Int32,
                    CellValNum::single(),
                )],
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

    #[test]
    fn bin_reader_reads_two_cells_then_eof() {
        let schema = schema();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3i32.to_ne_bytes());
        bytes.extend_from_slice(&7i32.to_ne_bytes());
        bytes.extend_from_slice(&9i32.to_ne_bytes());
        bytes.extend_from_slice(&1i32.to_ne_bytes());

        let mut reader = BinCellReader::new(Cursor::new(bytes), schema, 0);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.payload(), 3i32.to_ne_bytes().iter().chain(7i32.to_ne_bytes().iter()).copied().collect::<Vec<u8>>());
        assert!(reader.advance().unwrap());
        assert!(!reader.advance().unwrap());
    }

    #[test]
    fn bin_reader_reads_consolidation_ids() {
        let schema = schema();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i64.to_ne_bytes());
        bytes.extend_from_slice(&2i64.to_ne_bytes());
        bytes.extend_from_slice(&3i32.to_ne_bytes());
        bytes.extend_from_slice(&7i32.to_ne_bytes());

        let mut reader = BinCellReader::new(Cursor::new(bytes), schema, 2);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.ids(), &[1i64, 2]);
    }

    #[test]
    fn csv_reader_reads_lines() {
        let schema = schema();
        let text = "3,7\n9,1\n";
        let mut reader = CsvCellReader::new(
            Cursor::new(text.as_bytes().to_vec()),
            schema.clone(),
            vec![0],
            vec![0],
            ',',
        );
        assert!(reader.advance().unwrap());
        assert!(reader.advance().unwrap());
        assert!(!reader.advance().unwrap());
    }
}
