use std::io;
use thiserror::Error;

use super::PageNo;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Page not found: page_no={page_no}, file holds {page_count} pages")]
    PageNotFound { page_no: PageNo, page_count: u32 },

    #[error("Page out of range: page_no={page_no}, file holds {page_count} pages")]
    PageOutOfRange { page_no: PageNo, page_count: u32 },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
