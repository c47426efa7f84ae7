mod error;
mod page;
mod pool;

pub use error::{BufferError, BufferResult};
pub use page::{Page, PageRef};
pub use pool::BufferPool;

/// Default number of pages in the buffer pool
pub const DEFAULT_BUFFER_PAGES: usize = 50;
