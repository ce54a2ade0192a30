use tiledb_common::array::{CellValNum, Compression};
use tiledb_common::datatype::CellType;

/// One `(name, cell_type, val_num)` entry from `attributes[]` (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeData {
    pub name: String,
    pub cell_type: CellType,
    pub val_num: CellValNum,
}

impl AttributeData {
    pub fn new(
        name: impl Into<String>,
        cell_type: CellType,
        val_num: CellValNum,
    ) -> Self {
        AttributeData {
            name: name.into(),
            cell_type,
            val_num,
        }
    }

    pub fn is_var_sized(&self) -> bool {
        self.val_num.is_var_sized()
    }
}

pub(crate) fn default_compression(len: usize) -> Vec<Compression> {
    vec![Compression::None; len]
}
