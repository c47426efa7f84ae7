use thiserror::Error;

use super::record::PageId;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("String length {len} exceeds max length {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("Unknown field type: {0}")]
    UnknownType(String),

    #[error("Page full: {0}")]
    PageFull(PageId),

    #[error("Record not found on page {page_id}: {detail}")]
    RecordNotFound { page_id: PageId, detail: String },

    #[error("Record has no location: {0}")]
    Unplaced(String),

    #[error("Page size {page_size} cannot hold a single record of {record_size} bytes")]
    PageTooSmall { page_size: usize, record_size: usize },

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
