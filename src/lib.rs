pub mod buffer;
pub mod catalog;
pub mod config;
pub mod database;
pub mod file;
pub mod heap;
pub mod lock;
pub mod record;
pub mod transaction;

pub use buffer::{BufferError, BufferPool, BufferResult, Page, PageRef};
pub use catalog::{Catalog, CatalogError, CatalogResult, TableDef};
pub use config::{ConfigError, EngineConfig};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use file::{DEFAULT_PAGE_SIZE, FileError, PagedFile};
pub use heap::{HeapFile, HeapScan, encoder};
pub use lock::{LockError, LockManager, LockMode};
pub use record::{
    Field, FieldDef, HeapPage, PageId, Record, RecordError, RecordId, RecordResult, STRING_LEN,
    Schema, TableId, Type,
};
pub use transaction::{TransactionId, TransactionIdGenerator};
