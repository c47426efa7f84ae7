use std::path::Path;
use std::sync::{Arc, PoisonError};

use crate::buffer::{BufferPool, BufferResult, Page, PageRef};
use crate::file::{PageNo, PagedFile};
use crate::lock::LockMode;
use crate::record::{HeapPage, PageId, Record, RecordError, RecordId, Schema, TableId};
use crate::transaction::TransactionId;

use super::scan::HeapScan;

/// Unordered pages of records of one schema, backed by a single file.
///
/// Reads and writes through [`HeapFile::read_page`] and
/// [`HeapFile::write_page`] go straight to disk. Record operations go
/// through the buffer pool so they take part in locking.
#[derive(Debug)]
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    file: PagedFile,
}

impl HeapFile {
    /// Open or create the heap file at `path`
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<Schema>, page_size: usize) -> BufferResult<Self> {
        if HeapPage::max_records(page_size, &schema) == 0 {
            return Err(RecordError::PageTooSmall {
                page_size,
                record_size: schema.record_size(),
            }
            .into());
        }

        Ok(Self {
            table_id: TableId(0),
            schema,
            file: PagedFile::open(path, page_size)?,
        })
    }

    /// Id under which the catalog registered this file
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub(crate) fn set_table_id(&mut self, table_id: TableId) {
        self.table_id = table_id;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn page_size(&self) -> usize {
        self.file.page_size()
    }

    pub fn num_pages(&self) -> BufferResult<u32> {
        Ok(self.file.page_count()?)
    }

    /// Read and decode one page from disk
    pub fn read_page(&self, page_id: PageId) -> BufferResult<Page> {
        let mut data = vec![0u8; self.page_size()];
        self.file.read_page(page_id.page_no, &mut data)?;
        let page = HeapPage::new(page_id, Arc::clone(&self.schema), self.page_size(), &data)?;
        Ok(page.into())
    }

    /// Write one page to disk at its own page number
    pub fn write_page(&self, page: &Page) -> BufferResult<()> {
        self.file.write_page(page.id().page_no, &page.page_data())?;
        Ok(())
    }

    /// Grow the file by one empty page
    pub fn append_empty_page(&self) -> BufferResult<PageNo> {
        let data = HeapPage::empty_page_data(self.page_size());
        Ok(self.file.append_page(&data)?)
    }

    /// Flush OS buffers for the underlying file
    pub fn sync(&self) -> BufferResult<()> {
        Ok(self.file.sync()?)
    }

    /// Put `record` in the first page with a free slot, appending a new
    /// page when every existing one is full. Returns where the record went
    /// and the page it dirtied.
    pub fn insert_record(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: Record,
    ) -> BufferResult<(RecordId, Vec<PageRef>)> {
        if **record.schema() != *self.schema {
            return Err(RecordError::SchemaMismatch(format!(
                "Record schema [{}] does not match table schema [{}]",
                record.schema(),
                self.schema
            ))
            .into());
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let page = pool.fetch_page(tid, page_id, LockMode::Exclusive)?;
            if has_free_slot(&page) {
                let rid = insert_into(&page, tid, record)?;
                return Ok((rid, vec![page]));
            }
        }

        // Someone else may fill the new page before we lock it
        loop {
            let page_no = self.append_empty_page()?;
            let page_id = PageId::new(self.table_id, page_no);
            let page = pool.fetch_page(tid, page_id, LockMode::Exclusive)?;
            if has_free_slot(&page) {
                let rid = insert_into(&page, tid, record)?;
                return Ok((rid, vec![page]));
            }
        }
    }

    /// Remove `record` from the page its location names. Returns the page
    /// it dirtied.
    pub fn delete_record(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: &Record,
    ) -> BufferResult<Vec<PageRef>> {
        let rid = record.location()?;
        // Checked before locking so no lock is taken on a page that cannot exist
        if rid.page_id.table_id != self.table_id || rid.page_id.page_no >= self.num_pages()? {
            return Err(RecordError::RecordNotFound {
                page_id: rid.page_id,
                detail: format!("{} has no such page", self.table_id),
            }
            .into());
        }
        let page = pool.fetch_page(tid, rid.page_id, LockMode::Exclusive)?;
        {
            let mut guard = page.write().unwrap_or_else(PoisonError::into_inner);
            let heap = heap_page_mut(&mut guard, rid.page_id)?;
            heap.delete_record(record)?;
            heap.mark_dirty(Some(tid));
        }
        Ok(vec![page])
    }

    /// Iterate over every record in the file on behalf of `tid`
    pub fn scan<'a>(self: &Arc<Self>, pool: &'a BufferPool, tid: TransactionId) -> BufferResult<HeapScan<'a>> {
        HeapScan::open(pool, Arc::clone(self), tid)
    }
}

fn heap_page_mut(page: &mut Page, page_id: PageId) -> BufferResult<&mut HeapPage> {
    page.as_heap_mut()
        .ok_or_else(|| RecordError::Deserialization(format!("{} is not a heap page", page_id)).into())
}

fn has_free_slot(page: &PageRef) -> bool {
    page.read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_heap()
        .is_some_and(|heap| heap.num_empty_slots() > 0)
}

fn insert_into(page: &PageRef, tid: TransactionId, record: Record) -> BufferResult<RecordId> {
    let mut guard = page.write().unwrap_or_else(PoisonError::into_inner);
    let page_id = guard.id();
    let heap = heap_page_mut(&mut guard, page_id)?;
    let rid = heap.insert_record(record)?;
    heap.mark_dirty(Some(tid));
    Ok(rid)
}
