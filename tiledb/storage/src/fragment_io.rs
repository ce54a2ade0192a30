use std::path::Path;
use std::rc::Rc;

use tiledb_cell::{default_attribute_ids, read_values, Cell};
use tiledb_common::array::Compression;
use tiledb_common::{Error as CommonError, Result};
use tiledb_schema::geometry::CoordValue;
use tiledb_schema::{coords_type_go, ArraySchema};
use tiledb_collection::CellSource;

use crate::compressor::{Compressor, GzipCompressor};
use crate::error::StorageError;
use crate::fragment::{tdt_file_name, TileBookkeeping};
use crate::vfs::Vfs;

fn coords_as_f64(schema: &ArraySchema, payload: &[u8]) -> Vec<f64> {
    coords_type_go!(schema, T, {
        let values: Vec<T> = read_values(&payload[..schema.coords_size()], schema.dim_num())
            .expect("payload coords length matches schema");
        values.into_iter().map(CoordValue::to_f64).collect()
    })
}

/// Writes one column file, gzip-wrapping it (and suffixing the name) when
/// the schema asks for it (§6 "output files may be gzip-wrapped"). `Rle`
/// and `Lz` are accepted by schema validation but have no storage-layer
/// codec in this crate, so they fall back to uncompressed.
fn write_column(
    vfs: &dyn Vfs,
    dir: &Path,
    file_name: &str,
    compression: Compression,
    gzip_suffix: &str,
    bytes: &[u8],
) -> Result<()> {
    match compression {
        Compression::Gzip => {
            let compressed = GzipCompressor.compress(bytes)?;
            vfs.write(&dir.join(format!("{file_name}{gzip_suffix}")), &compressed)
        }
        Compression::None | Compression::Rle | Compression::Lz => {
            vfs.write(&dir.join(file_name), bytes)
        }
    }
}

/// Reads one column file back, sniffing the gzip suffix rather than
/// trusting the schema's compression tag (§6 "the reader sniffs the
/// suffix").
fn read_column(vfs: &dyn Vfs, dir: &Path, file_name: &str, gzip_suffix: &str) -> Result<Vec<u8>> {
    let gz_path = dir.join(format!("{file_name}{gzip_suffix}"));
    if vfs.exists(&gz_path) {
        GzipCompressor.decompress(&vfs.read(&gz_path)?)
    } else {
        vfs.read(&dir.join(file_name))
    }
}

/// Splits canonical cell payloads (the binary layout `tiledb_cell::Cell`
/// reads: coords, an optional `cell_size` header, then attribute data in
/// natural attribute order) into one column file per attribute plus one
/// for coordinates (§4.5's `<attr_id>.tdt` table), and computes
/// `capacity`-sized tile bookkeeping over the run.
pub fn write_fragment_columns(
    vfs: &dyn Vfs,
    dir: &Path,
    schema: &ArraySchema,
    gzip_suffix: &str,
    payloads: &[Vec<u8>],
) -> Result<TileBookkeeping> {
    let attribute_ids = default_attribute_ids(schema);
    let mut coords_out = Vec::new();
    let mut attr_outs: Vec<Vec<u8>> = vec![Vec::new(); schema.attribute_num()];

    for payload in payloads {
        let cell = Cell::new(schema, attribute_ids.clone(), payload);
        coords_out.extend_from_slice(cell.coords_bytes());
        let mut it = cell.attr_begin();
        for v in &mut it {
            let attr = &schema.attributes()[v.attr_id];
            if attr.is_var_sized() {
                let count = (v.bytes.len() / attr.cell_type.size()) as i32;
                attr_outs[v.attr_id].extend_from_slice(&count.to_ne_bytes());
            }
            attr_outs[v.attr_id].extend_from_slice(v.bytes);
        }
        if let Some(err) = it.err() {
            return Err(CommonError::new(err.kind(), err.to_string()));
        }
    }

    write_column(
        vfs,
        dir,
        &tdt_file_name(schema.attribute_num()),
        schema.coords_compression(),
        gzip_suffix,
        &coords_out,
    )?;
    for (attr_id, bytes) in attr_outs.iter().enumerate() {
        write_column(
            vfs,
            dir,
            &tdt_file_name(attr_id),
            schema.compression()[attr_id],
            gzip_suffix,
            bytes,
        )?;
    }

    Ok(compute_bookkeeping(schema, payloads))
}

fn compute_bookkeeping(schema: &ArraySchema, payloads: &[Vec<u8>]) -> TileBookkeeping {
    let capacity = (schema.capacity() as usize).max(1);
    let dim_num = schema.dim_num();
    let total = payloads.len();

    let mut tile_ids = Vec::new();
    let mut offsets = Vec::new();
    let mut bounding_coordinates = Vec::new();
    let mut mbrs = Vec::new();

    let mut tile_index = 0u64;
    let mut start = 0usize;
    while start < total {
        let end = (start + capacity).min(total);

        tile_ids.push(tile_index);
        offsets.push(start as u64);

        let first = coords_as_f64(schema, &payloads[start]);
        let last = coords_as_f64(schema, &payloads[end - 1]);
        bounding_coordinates.extend_from_slice(&first);
        bounding_coordinates.extend_from_slice(&last);

        let mut mins = vec![f64::INFINITY; dim_num];
        let mut maxs = vec![f64::NEG_INFINITY; dim_num];
        for payload in &payloads[start..end] {
            let coords = coords_as_f64(schema, payload);
            for d in 0..dim_num {
                mins[d] = mins[d].min(coords[d]);
                maxs[d] = maxs[d].max(coords[d]);
            }
        }
        for d in 0..dim_num {
            mbrs.push(mins[d]);
            mbrs.push(maxs[d]);
        }

        tile_index += 1;
        start = end;
    }

    TileBookkeeping {
        tile_ids,
        offsets,
        bounding_coordinates,
        mbrs,
    }
}

/// Reassembles canonical cell payloads from a fragment's column files, one
/// cell at a time, implementing [CellSource] so fragments can feed the same
/// sort-merge machinery as a plain `.bin` stream. `ids()` reports a
/// constant `[fragment_index, 0]` -- the "origin" stamp spec.md §4.4 asks a
/// consolidating `BINFileCollection` to carry, here attached at merge time
/// rather than persisted per cell.
pub struct FragmentCellSource {
    coords: Vec<u8>,
    coords_pos: usize,
    attrs: Vec<Vec<u8>>,
    attrs_pos: Vec<usize>,
    schema: Rc<ArraySchema>,
    cell_buf: Vec<u8>,
    ids_buf: Vec<i64>,
}

impl FragmentCellSource {
    pub fn open(
        vfs: &dyn Vfs,
        fragment_dir: &Path,
        schema: Rc<ArraySchema>,
        gzip_suffix: &str,
        fragment_index: i64,
    ) -> Result<Self> {
        let coords = read_column(
            vfs,
            fragment_dir,
            &tdt_file_name(schema.attribute_num()),
            gzip_suffix,
        )?;
        let mut attrs = Vec::with_capacity(schema.attribute_num());
        for attr_id in 0..schema.attribute_num() {
            attrs.push(read_column(
                vfs,
                fragment_dir,
                &tdt_file_name(attr_id),
                gzip_suffix,
            )?);
        }
        let attrs_pos = vec![0; attrs.len()];
        Ok(FragmentCellSource {
            coords,
            coords_pos: 0,
            attrs,
            attrs_pos,
            schema,
            cell_buf: Vec::new(),
            ids_buf: vec![fragment_index, 0],
        })
    }
}

impl CellSource for FragmentCellSource {
    fn advance(&mut self) -> Result<bool> {
        let coords_size = self.schema.coords_size();
        if self.coords_pos >= self.coords.len() {
            return Ok(false);
        }
        if self.coords_pos + coords_size > self.coords.len() {
            return Err(StorageError::Inconsistent("coords.tdt truncated".to_string()).into());
        }
        let coords_bytes = self.coords[self.coords_pos..self.coords_pos + coords_size].to_vec();
        self.coords_pos += coords_size;

        let mut attrs_bytes = Vec::new();
        for attr_id in 0..self.schema.attribute_num() {
            let attr = &self.schema.attributes()[attr_id];
            let buf = &self.attrs[attr_id];
            let pos = self.attrs_pos[attr_id];

            if attr.is_var_sized() {
                if pos + 4 > buf.len() {
                    return Err(
                        StorageError::Inconsistent(format!("{attr_id}.tdt truncated")).into()
                    );
                }
                let count = i32::from_ne_bytes(buf[pos..pos + 4].try_into().unwrap());
                if count < 0 {
                    return Err(StorageError::Inconsistent(format!(
                        "{attr_id}.tdt has a negative count"
                    ))
                    .into());
                }
                let len = count as usize * attr.cell_type.size();
                let data_start = pos + 4;
                if data_start + len > buf.len() {
                    return Err(
                        StorageError::Inconsistent(format!("{attr_id}.tdt truncated")).into()
                    );
                }
                attrs_bytes.extend_from_slice(&count.to_ne_bytes());
                attrs_bytes.extend_from_slice(&buf[data_start..data_start + len]);
                self.attrs_pos[attr_id] = data_start + len;
            } else {
                let val_num = attr
                    .val_num
                    .fixed()
                    .expect("fixed attribute has a fixed val_num")
                    .get() as usize;
                let len = val_num * attr.cell_type.size();
                if pos + len > buf.len() {
                    return Err(
                        StorageError::Inconsistent(format!("{attr_id}.tdt truncated")).into()
                    );
                }
                attrs_bytes.extend_from_slice(&buf[pos..pos + len]);
                self.attrs_pos[attr_id] = pos + len;
            }
        }

        self.cell_buf.clear();
        self.cell_buf.extend_from_slice(&coords_bytes);
        if self.schema.attributes().iter().any(|a| a.is_var_sized()) {
            self.cell_buf
                .extend_from_slice(&attrs_bytes.len().to_ne_bytes());
        }
        self.cell_buf.extend_from_slice(&attrs_bytes);
        Ok(true)
    }

    fn payload(&self) -> &[u8] {
        &self.cell_buf
    }

    fn ids(&self) -> &[i64] {
        &self.ids_buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::LocalVfs;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::{CellType, CoordsType};
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn schema() -> Rc<ArraySchema> {
        Rc::new(
            ArraySchema::new(
                "io",
                vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
                vec![DimensionData::new("x", 0.0, 99.0)],
                CoordsType::Int32,
                CellOrder::RowMajor,
                TileOrder::None,
                Vec::new(),
                2,
                10,
                vec![Compression::None, Compression::None],
            )
            .unwrap(),
        )
    }

    fn payload(coord: i32, value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&coord.to_ne_bytes());
        out.extend_from_slice(&value.to_ne_bytes());
        out
    }

    #[test]
    fn columns_round_trip_through_fragment_cell_source() {
        let schema = schema();
        let vfs = LocalVfs;
        let dir = tempfile::tempdir().unwrap();

        let payloads = vec![payload(1, 10), payload(2, 20), payload(3, 30)];
        let bookkeeping =
            write_fragment_columns(&vfs, dir.path(), &schema, ".gz", &payloads).unwrap();
        assert_eq!(bookkeeping.tile_ids, vec![0, 1]);
        assert_eq!(bookkeeping.offsets, vec![0, 2]);

        let mut source =
            FragmentCellSource::open(&vfs, dir.path(), schema.clone(), ".gz", 7).unwrap();
        let mut out = Vec::new();
        while source.advance().unwrap() {
            assert_eq!(source.ids(), &[7, 0]);
            let coord = i32::from_ne_bytes(source.payload()[0..4].try_into().unwrap());
            let value = i32::from_ne_bytes(source.payload()[4..8].try_into().unwrap());
            out.push((coord, value));
        }
        assert_eq!(out, vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_compressed_columns_round_trip_and_are_suffixed_on_disk() {
        let schema = Rc::new(
            ArraySchema::new(
                "io_gz",
                vec![AttributeData::new("a", CellType::Int32, CellValNum::single())],
                vec![DimensionData::new("x", 0.0, 99.0)],
                CoordsType::Int32,
                CellOrder::RowMajor,
                TileOrder::None,
                Vec::new(),
                2,
                10,
                vec![Compression::Gzip, Compression::Gzip],
            )
            .unwrap(),
        );
        let vfs = LocalVfs;
        let dir = tempfile::tempdir().unwrap();

        let payloads = vec![payload(1, 10), payload(2, 20)];
        write_fragment_columns(&vfs, dir.path(), &schema, ".gz", &payloads).unwrap();
        assert!(vfs.exists(&dir.path().join("1.tdt.gz")));
        assert!(vfs.exists(&dir.path().join("0.tdt.gz")));

        let mut source =
            FragmentCellSource::open(&vfs, dir.path(), schema.clone(), ".gz", 0).unwrap();
        let mut out = Vec::new();
        while source.advance().unwrap() {
            let coord = i32::from_ne_bytes(source.payload()[0..4].try_into().unwrap());
            let value = i32::from_ne_bytes(source.payload()[4..8].try_into().unwrap());
            out.push((coord, value));
        }
        assert_eq!(out, vec![(1, 10), (2, 20)]);
    }
}
