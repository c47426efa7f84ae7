use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::buffer::{BufferError, BufferPool, PageRef};
use crate::catalog::{Catalog, CatalogError};
use crate::config::{ConfigError, EngineConfig};
use crate::heap::{HeapFile, HeapScan};
use crate::lock::LockMode;
use crate::record::{PageId, Record, RecordError, RecordId, Schema, TableId};
use crate::transaction::{TransactionId, TransactionIdGenerator};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Buffer(#[from] BufferError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

impl DatabaseError {
    /// Whether the transaction was aborted by the engine and may be retried
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            DatabaseError::Buffer(BufferError::TransactionAborted { .. })
        )
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Engine context owning the catalog, the buffer pool (and through it the
/// lock manager) and the transaction id source.
///
/// Dropping a database does not flush anything. Call
/// [`Database::checkpoint`] to force every cached change to disk.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    catalog: Arc<Catalog>,
    pool: BufferPool,
    tids: TransactionIdGenerator,
}

impl Database {
    /// An engine with no tables
    pub fn new(config: EngineConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::new());
        let pool = BufferPool::new(Arc::clone(&catalog), config.buffer_pages, config.lock_timeout())?;
        Ok(Self {
            config,
            catalog,
            pool,
            tids: TransactionIdGenerator::new(),
        })
    }

    /// An engine with the tables listed in the schema file at `catalog_path`
    pub fn open<P: AsRef<Path>>(catalog_path: P, config: EngineConfig) -> DatabaseResult<Self> {
        let db = Self::new(config)?;
        db.catalog.load_schema(catalog_path, db.config.page_size)?;
        Ok(db)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        schema: Schema,
        primary_key: Option<&str>,
    ) -> DatabaseResult<TableId> {
        let file = HeapFile::open(path, Arc::new(schema), self.config.page_size)?;
        Ok(self.catalog.add_table(file, name, primary_key))
    }

    /// Start a new transaction
    pub fn begin(&self) -> TransactionId {
        let tid = self.tids.next_id();
        tracing::debug!(%tid, "begin");
        tid
    }

    pub fn fetch_page(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> DatabaseResult<PageRef> {
        Ok(self.pool.fetch_page(tid, page_id, mode)?)
    }

    pub fn insert_record(&self, tid: TransactionId, table_id: TableId, record: Record) -> DatabaseResult<RecordId> {
        Ok(self.pool.insert_record(tid, table_id, record)?)
    }

    pub fn delete_record(&self, tid: TransactionId, record: &Record) -> DatabaseResult<()> {
        Ok(self.pool.delete_record(tid, record)?)
    }

    /// Write the transaction's changes to disk and release its locks
    pub fn commit(&self, tid: TransactionId) -> DatabaseResult<()> {
        Ok(self.pool.transaction_complete(tid, true)?)
    }

    /// Throw away the transaction's cached changes and release its locks
    pub fn abort(&self, tid: TransactionId) -> DatabaseResult<()> {
        Ok(self.pool.transaction_complete(tid, false)?)
    }

    /// Scan every record of `table_id` on behalf of `tid`
    pub fn open_scan(&self, tid: TransactionId, table_id: TableId) -> DatabaseResult<HeapScan<'_>> {
        let file = self.catalog.file(table_id)?;
        Ok(file.scan(&self.pool, tid)?)
    }

    /// Flush every dirty page, committed or not, and sync the table files
    pub fn checkpoint(&self) -> DatabaseResult<()> {
        self.pool.flush_all()?;
        for table_id in self.catalog.table_ids() {
            self.catalog.file(table_id)?.sync()?;
        }
        tracing::debug!("checkpoint complete");
        Ok(())
    }
}
