use thiserror::Error;

use tiledb_common::array::CellValNum;
use tiledb_common::datatype::CellType;
use tiledb_common::physical::PhysicalType;
use tiledb_common::{Error as CommonError, ErrorKind, Result};
use tiledb_schema::{coords_type_go, ArraySchema};

use crate::cell::{default_attribute_ids, Cell};
use crate::cell_type_go;
use crate::codec::BinaryCodec;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CsvCellError {
    #[error("expected {want} fields, got {got}")]
    WrongFieldCount { want: usize, got: usize },
    #[error("malformed field: {0}")]
    Malformed(String),
}

impl From<CsvCellError> for CommonError {
    fn from(e: CsvCellError) -> Self {
        CommonError::new(ErrorKind::Parse, e.to_string())
    }
}

/// The per-type binary NULL sentinel (§6): `type's max`, except `Char`,
/// whose sentinel is the literal `*` byte rather than `u8::MAX`.
pub fn null_sentinel_bytes(cell_type: CellType) -> Vec<u8> {
    if cell_type.is_char() {
        return vec![b'*'];
    }
    cell_type_go!(cell_type, T, {
        let mut out = Vec::new();
        T::null_sentinel().write_ne(&mut out);
        out
    })
}

/// The per-type binary DEL (tombstone) sentinel (§6): `sentinel - 1`,
/// except `Char`, whose sentinel is the literal `$` byte.
pub fn del_sentinel_bytes(cell_type: CellType) -> Vec<u8> {
    if cell_type.is_char() {
        return vec![b'$'];
    }
    cell_type_go!(cell_type, T, {
        let mut out = Vec::new();
        T::del_sentinel().write_ne(&mut out);
        out
    })
}

fn is_all_sentinel(bytes: &[u8], sentinel: &[u8]) -> bool {
    !bytes.is_empty() && !sentinel.is_empty() && bytes.chunks(sentinel.len()).all(|c| c == sentinel)
}

/// Renders one attribute's raw bytes as a CSV field: `*`/`$` for an
/// all-sentinel value, the UTF-8 text for `char`, else each sub-value
/// (multi-valued attributes) formatted at `precision` and joined with `:`.
fn format_attr_field(cell_type: CellType, bytes: &[u8], precision: usize) -> String {
    if is_all_sentinel(bytes, &null_sentinel_bytes(cell_type)) {
        return "*".to_string();
    }
    if is_all_sentinel(bytes, &del_sentinel_bytes(cell_type)) {
        return "$".to_string();
    }
    if cell_type.is_char() {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    cell_type_go!(cell_type, T, {
        bytes
            .chunks(T::SIZE)
            .map(|c| T::read_ne(c).format_text(precision))
            .collect::<Vec<_>>()
            .join(":")
    })
}

fn parse_attr_field(
    cell_type: CellType,
    val_num: CellValNum,
    token: &str,
) -> Result<Vec<u8>> {
    let sentinel_count = match val_num {
        CellValNum::Fixed(n) => n.get() as usize,
        CellValNum::Var => 1,
    };
    if token == "*" {
        return Ok(null_sentinel_bytes(cell_type).repeat(sentinel_count));
    }
    if token == "$" {
        return Ok(del_sentinel_bytes(cell_type).repeat(sentinel_count));
    }
    if cell_type.is_char() {
        return Ok(token.as_bytes().to_vec());
    }
    let mut out = Vec::new();
    cell_type_go!(cell_type, T, {
        for part in token.split(':') {
            let v = T::parse_text(part).map_err(CsvCellError::Malformed)?;
            v.write_ne(&mut out);
        }
    });
    Ok(out)
}

/// Writes `cell`'s coordinates (in `dim_ids` order) followed by its
/// attributes (in the cell's own `attribute_ids` order), `delimiter`
/// -separated, numeric fields rendered at `precision` decimal places
/// (§4.2 "CSV-line formatter").
pub fn cell_to_csv_line(cell: &Cell, dim_ids: &[usize], delimiter: char, precision: usize) -> String {
    let schema = cell.schema();
    let coords_bytes = cell.coords_bytes();
    let coord_size = schema.coords_type().size();

    let mut fields: Vec<String> = Vec::with_capacity(dim_ids.len() + schema.attribute_num());

    for &dim_id in dim_ids {
        let slice = &coords_bytes[dim_id * coord_size..(dim_id + 1) * coord_size];
        let field = coords_type_go!(schema, T, { T::read_ne(slice).format_text(precision) });
        fields.push(field);
    }

    let mut it = cell.attr_begin();
    for v in &mut it {
        let attr = &schema.attributes()[v.attr_id];
        fields.push(format_attr_field(attr.cell_type, v.bytes, precision));
    }

    fields.join(&delimiter.to_string())
}

/// Parses one CSV line into a binary cell payload (§4.2 layout), the
/// inverse of [cell_to_csv_line]. `dim_ids[i]` names which dimension the
/// `i`-th coordinate field belongs to; `attribute_ids` (coords id
/// excluded) names which attribute each subsequent field belongs to, in
/// order.
pub fn csv_line_to_cell_bytes(
    schema: &ArraySchema,
    attribute_ids: &[usize],
    dim_ids: &[usize],
    line: &str,
    delimiter: char,
) -> Result<Vec<u8>> {
    let fields: Vec<&str> = line.split(delimiter).collect();
    let want = dim_ids.len() + attribute_ids.len();
    if fields.len() != want {
        return Err(CsvCellError::WrongFieldCount {
            want,
            got: fields.len(),
        }
        .into());
    }

    let coord_size = schema.coords_type().size();
    let mut coords_bytes = vec![0u8; schema.dim_num() * coord_size];
    for (i, &dim_id) in dim_ids.iter().enumerate() {
        let mut encoded = Vec::new();
        coords_type_go!(schema, T, {
            let v = T::parse_text(fields[i]).map_err(CsvCellError::Malformed)?;
            v.write_ne(&mut encoded);
        });
        coords_bytes[dim_id * coord_size..(dim_id + 1) * coord_size]
            .copy_from_slice(&encoded);
    }

    let mut attrs_bytes = Vec::new();
    for (i, &attr_id) in attribute_ids.iter().enumerate() {
        let attr = &schema.attributes()[attr_id];
        let token = fields[dim_ids.len() + i];
        let value_bytes = parse_attr_field(attr.cell_type, attr.val_num, token)?;
        if attr.is_var_sized() {
            let count = (value_bytes.len() / attr.cell_type.size()) as i32;
            attrs_bytes.extend_from_slice(&count.to_ne_bytes());
        }
        attrs_bytes.extend_from_slice(&value_bytes);
    }

    let is_var_sized = schema.attributes().iter().any(|a| a.is_var_sized());
    let mut payload = coords_bytes;
    if is_var_sized {
        payload.extend_from_slice(&attrs_bytes.len().to_ne_bytes());
    }
    payload.extend_from_slice(&attrs_bytes);
    Ok(payload)
}

/// Convenience: parse a line using the schema's natural attribute/dimension
/// order (every real attribute, coords implicit).
pub fn csv_line_to_cell_bytes_default_order(
    schema: &ArraySchema,
    line: &str,
    delimiter: char,
) -> Result<Vec<u8>> {
    let attribute_ids: Vec<usize> = (0..schema.attribute_num()).collect();
    let dim_ids: Vec<usize> = (0..schema.dim_num()).collect();
    csv_line_to_cell_bytes(schema, &attribute_ids, &dim_ids, line, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiledb_common::array::{CellOrder, CellValNum, Compression, TileOrder};
    use tiledb_common::datatype::CoordsType;
    use tiledb_schema::attribute::AttributeData;
    use tiledb_schema::dimension::DimensionData;

    fn s2_schema() -> ArraySchema {
        ArraySchema::new(
            "s2",
            vec![AttributeData::new("a", CellType::Char, CellValNum::Var)],
            vec![DimensionData::new("x", 0.0, 1000.0)],
            CoordsType::Int64,
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
    fn s2_variable_attribute_round_trip() {
        let schema = s2_schema();

        let bytes = csv_line_to_cell_bytes_default_order(&schema, "10,abc", ',').unwrap();
        let ids = default_attribute_ids(&schema);
        let cell = Cell::new(&schema, ids.clone(), &bytes);
        assert_eq!(cell.coords::<i64>(), vec![10]);
        let line = cell_to_csv_line(&cell, &[0], ',', 6);
        assert_eq!(line, "10,abc");

        let bytes2 = csv_line_to_cell_bytes_default_order(&schema, "5,zz", ',').unwrap();
        let cell2 = Cell::new(&schema, ids, &bytes2);
        assert_eq!(cell2.coords::<i64>(), vec![5]);
        let line2 = cell_to_csv_line(&cell2, &[0], ',', 6);
        assert_eq!(line2, "5,zz");

        assert!(cell2.precedes(&cell));
    }

    #[test]
    fn null_and_del_sentinels_render_as_star_and_dollar() {
        let schema = ArraySchema::new(
            "fixed",
            vec![AttributeData::new("v", CellType::Int32, CellValNum::single())],
            vec![DimensionData::new("x", 0.0, 100.0)],
            CoordsType::Int32,
            CellOrder::RowMajor,
            TileOrder::None,
            Vec::new(),
            10,
            10,
            vec![Compression::None, Compression::None],
        )
        .unwrap();

        let bytes = csv_line_to_cell_bytes_default_order(&schema, "3,*", ',').unwrap();
        let ids = default_attribute_ids(&schema);
        let cell = Cell::new(&schema, ids.clone(), &bytes);
        assert_eq!(cell_to_csv_line(&cell, &[0], ',', 0), "3,*");

        let bytes = csv_line_to_cell_bytes_default_order(&schema, "3,$", ',').unwrap();
        let cell = Cell::new(&schema, ids, &bytes);
        assert_eq!(cell_to_csv_line(&cell, &[0], ',', 0), "3,$");
    }

    #[test]
    fn wrong_field_count_is_a_parse_error() {
        let schema = s2_schema();
        let err = csv_line_to_cell_bytes_default_order(&schema, "10", ',').unwrap_err();
        assert_eq!(err.kind(), tiledb_common::ErrorKind::Parse);
    }
}
