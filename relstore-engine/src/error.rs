//! Error taxonomy for the record manager.
//!
//! Every fallible operation returns [`EngineResult`]. Nothing is recovered
//! internally; pinned pages and buffers are released on every early return
//! before the error surfaces.

use thiserror::Error;

use crate::storage::schema::DataType;

/// Main error type for the relstore engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A handle, schema, or record argument was unusable.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The table name is empty or otherwise unusable as a file path.
    #[error("invalid table name")]
    InvalidName,

    /// The record id points outside the table's data pages.
    #[error("record id ({page}, {slot}) is out of range")]
    InvalidRid { page: u32, slot: u32 },

    /// An attribute index is outside the schema.
    #[error("attribute index {0} is out of range")]
    InvalidAttribute(usize),

    /// A value's type does not match the attribute it is used with.
    #[error("attribute type mismatch: expected {expected:?}, got {found:?}")]
    AttributeTypeMismatch { expected: DataType, found: DataType },

    /// An on-disk data-type tag is not one of the supported types.
    #[error("unsupported data type tag {0}")]
    DataTypeError(i32),

    /// The slot exists but holds no live record.
    #[error("no record at ({page}, {slot})")]
    RecordNotFound { page: u32, slot: u32 },

    /// Data that must fit on a single page does not.
    #[error("data does not fit on a single page")]
    PageFull,

    /// A scan has run off the end of the table.
    #[error("scan has no more tuples")]
    NoMoreTuples,

    /// Every buffer pool frame is pinned; nothing can be evicted.
    #[error("buffer pool has no unpinned frame to evict")]
    PoolExhausted,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True when a scan has simply been exhausted.
    pub fn is_no_more_tuples(&self) -> bool {
        matches!(self, EngineError::NoMoreTuples)
    }
}
