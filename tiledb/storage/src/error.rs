use thiserror::Error;

use tiledb_common::{Error as CommonError, ErrorKind};

/// The storage-layer failure modes named in spec.md §4.5 plus consolidation
/// (§4.5/§7 "Consolidation").
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("array is open for reading, not writing")]
    InvalidMode,
    #[error("too many open arrays (limit is {0})")]
    TooManyOpen(usize),
    #[error("array schema is missing at {0}")]
    SchemaMissing(String),
    #[error("array schema at {0} is corrupt: {1}")]
    SchemaCorrupt(String, String),
    #[error("write coordinate type does not match the schema's coords_type")]
    WrongType,
    #[error("write would exceed the {0}-byte write buffer")]
    BufferOverflow(usize),
    #[error("descriptor {0} is not open")]
    NotOpen(usize),
    #[error("reverse dense iteration is not supported")]
    ReverseDenseUnsupported,
    #[error("consolidation produced inconsistent tile bookkeeping: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for CommonError {
    fn from(e: StorageError) -> Self {
        let kind = match &e {
            StorageError::InvalidMode | StorageError::TooManyOpen(_) => ErrorKind::State,
            StorageError::SchemaMissing(_) | StorageError::SchemaCorrupt(_, _) => {
                ErrorKind::Schema
            }
            StorageError::WrongType => ErrorKind::InvalidArgument,
            StorageError::BufferOverflow(_) => ErrorKind::State,
            StorageError::NotOpen(_) => ErrorKind::State,
            StorageError::ReverseDenseUnsupported => ErrorKind::State,
            StorageError::Inconsistent(_) => ErrorKind::Consolidation,
            StorageError::Io(_) => ErrorKind::Io,
        };
        CommonError::new(kind, e.to_string())
    }
}
