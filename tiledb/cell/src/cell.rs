use thiserror::Error;

use tiledb_common::{Error as CommonError, ErrorKind};
use tiledb_schema::{coords_type_go, ArraySchema};

use crate::codec::{read_values, BinaryCodec};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CellError {
    #[error("attribute index {0} out of range")]
    NoSuchAttribute(usize),
    #[error("variable-length count is negative")]
    NegativeCount,
    #[error("cell buffer shorter than its declared layout")]
    Truncated,
}

impl From<CellError> for CommonError {
    fn from(e: CellError) -> Self {
        CommonError::new(ErrorKind::Codec, e.to_string())
    }
}

/// The pseudo attribute-id that stands for coordinates in `attribute_ids`
/// (§4.2: "coords id always last in the list, though coords come first in
/// bytes"). One past the last real attribute index, mirroring the source's
/// own convention of using `attribute_num` as the coordinates id.
pub fn coords_attr_id(schema: &ArraySchema) -> usize {
    schema.attribute_num()
}

/// The default `attribute_ids` order: every real attribute, then coords.
pub fn default_attribute_ids(schema: &ArraySchema) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..schema.attribute_num()).collect();
    ids.push(coords_attr_id(schema));
    ids
}

/// A logical `(coords, attrs...)` tuple over a borrowed binary payload
/// (§4.2 "`Cell` object contract").
#[derive(Clone, Debug)]
pub struct Cell<'a> {
    schema: &'a ArraySchema,
    attribute_ids: Vec<usize>,
    payload: &'a [u8],
}

impl<'a> Cell<'a> {
    pub fn new(
        schema: &'a ArraySchema,
        attribute_ids: Vec<usize>,
        payload: &'a [u8],
    ) -> Self {
        Cell {
            schema,
            attribute_ids,
            payload,
        }
    }

    pub fn schema(&self) -> &'a ArraySchema {
        self.schema
    }

    pub fn attribute_ids(&self) -> &[usize] {
        &self.attribute_ids
    }

    pub fn coords_attr_id(&self) -> usize {
        coords_attr_id(self.schema)
    }

    /// `val_num(attr_id) -> i32 | VAR`.
    pub fn val_num(&self, attr_id: usize) -> tiledb_common::Result<i32> {
        if attr_id == self.coords_attr_id() {
            Ok(self.schema.dim_num() as i32)
        } else {
            self.schema
                .attributes()
                .get(attr_id)
                .map(|a| i32::from(a.val_num))
                .ok_or_else(|| CellError::NoSuchAttribute(attr_id).into())
        }
    }

    /// Whether this particular attribute is variable-sized.
    pub fn var_size(&self, attr_id: usize) -> bool {
        attr_id != self.coords_attr_id()
            && self
                .schema
                .attributes()
                .get(attr_id)
                .is_some_and(|a| a.is_var_sized())
    }

    /// Whether the cell as a whole is variable-sized (any attribute is).
    pub fn is_var_sized(&self) -> bool {
        self.schema.attributes().iter().any(|a| a.is_var_sized())
    }

    pub fn cell_payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Rebinds this `Cell` to a new payload, keeping schema/`attribute_ids`
    /// -- the reuse path an iterator takes between cells.
    pub fn set_payload(&mut self, payload: &'a [u8]) {
        self.payload = payload;
    }

    fn header_len(&self) -> usize {
        self.schema.coords_size()
            + if self.is_var_sized() {
                std::mem::size_of::<usize>()
            } else {
                0
            }
    }

    pub fn coords_bytes(&self) -> &'a [u8] {
        &self.payload[..self.schema.coords_size()]
    }

    /// Typed coordinate values. The payload's length is an invariant of
    /// however this `Cell` was constructed (parsed from a stream whose
    /// reader already validated lengths, or freshly written); a mismatch
    /// here means that invariant was violated upstream.
    pub fn coords<T: BinaryCodec>(&self) -> Vec<T> {
        read_values(self.coords_bytes(), self.schema.dim_num())
            .expect("coords_bytes length matches dim_num * sizeof(coords_type)")
    }

    pub fn precedes(&self, other: &Cell) -> bool {
        let schema = self.schema;
        coords_type_go!(schema, T, {
            let a: Vec<T> = self.coords::<T>();
            let b: Vec<T> = other.coords::<T>();
            tiledb_schema::geometry::precedes(schema, &a, &b)
        })
    }

    pub fn succeeds(&self, other: &Cell) -> bool {
        other.precedes(self)
    }

    pub fn attr_begin(&self) -> AttrIter<'_, 'a> {
        AttrIter {
            cell: self,
            idx: 0,
            offset: self.header_len(),
            err: None,
        }
    }
}

/// `(attr_id, offset, typed_slice)` as yielded by [AttrIter].
#[derive(Clone, Copy, Debug)]
pub struct AttrValue<'a> {
    pub attr_id: usize,
    pub offset: usize,
    pub bytes: &'a [u8],
}

/// Walks `attribute_ids` (excluding the trailing coords id) in order,
/// advancing the byte cursor by each attribute's declared width.
pub struct AttrIter<'c, 'a> {
    cell: &'c Cell<'a>,
    idx: usize,
    offset: usize,
    err: Option<CommonError>,
}

impl<'c, 'a> AttrIter<'c, 'a> {
    /// True once every non-coordinate attribute has been visited.
    pub fn end(&self) -> bool {
        self.idx >= self.cell.attribute_ids.len().saturating_sub(1)
    }

    pub fn err(&self) -> Option<&CommonError> {
        self.err.as_ref()
    }

    pub fn current_offset(&self) -> usize {
        self.offset
    }
}

impl<'c, 'a> Iterator for AttrIter<'c, 'a> {
    type Item = AttrValue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.err.is_some() || self.end() {
            return None;
        }

        let attr_id = self.cell.attribute_ids[self.idx];
        let attr = &self.cell.schema.attributes()[attr_id];
        let payload = self.cell.payload;

        let (len, data_start) = if attr.is_var_sized() {
            if self.offset + 4 > payload.len() {
                self.err = Some(CellError::Truncated.into());
                return None;
            }
            let count = i32::from_ne_bytes(
                payload[self.offset..self.offset + 4].try_into().unwrap(),
            );
            if count < 0 {
                self.err = Some(CellError::NegativeCount.into());
                return None;
            }
            (count as usize * attr.cell_type.size(), self.offset + 4)
        } else {
            let val_num = attr
                .val_num
                .fixed()
                .expect("fixed attribute has a fixed val_num")
                .get() as usize;
            (val_num * attr.cell_type.size(), self.offset)
        };

        if data_start + len > payload.len() {
            self.err = Some(CellError::Truncated.into());
            return None;
        }

        let bytes = &payload[data_start..data_start + len];
        self.offset = data_start + len;
        self.idx += 1;

        Some(AttrValue {
            attr_id,
            offset: data_start,
            bytes,
        })
    }
}
