pub mod cell;
pub mod codec;
pub mod csv;
#[macro_use]
pub mod macros;

pub use cell::{default_attribute_ids, AttrIter, AttrValue, Cell, CellError};
pub use codec::{read_values, write_values, BinaryCodec};
pub use csv::{
    cell_to_csv_line, csv_line_to_cell_bytes, csv_line_to_cell_bytes_default_order,
    del_sentinel_bytes, null_sentinel_bytes, CsvCellError,
};
