pub mod collection;
pub mod consolidate;
pub mod reader;

pub use collection::{FileCollection, HeapEntry};
pub use consolidate::ConsolidatingCollection;
pub use reader::{BinCellReader, CellSource, CsvCellReader, IO_SEGMENT_SIZE};
