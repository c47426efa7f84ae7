use thiserror::Error;

use crate::file::FileError;
use crate::lock::LockError;
use crate::record::{PageId, RecordError, TableId};
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Transaction {tid} aborted: {source}")]
    TransactionAborted {
        tid: TransactionId,
        #[source]
        source: LockError,
    },

    #[error("Buffer pool is full: all {capacity} cached pages are dirty or in use")]
    AllPagesDirty { capacity: usize },

    #[error("Buffer pool capacity must be at least one page")]
    InvalidCapacity,

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Page not cached: {0}")]
    PageNotCached(PageId),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

pub type BufferResult<T> = Result<T, BufferError>;
