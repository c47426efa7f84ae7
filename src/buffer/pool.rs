use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use super::error::{BufferError, BufferResult};
use super::page::{Page, PageRef};
use crate::catalog::Catalog;
use crate::heap::HeapFile;
use crate::lock::{LockManager, LockMode};
use crate::record::{PageId, Record, RecordError, RecordId, TableId};
use crate::transaction::TransactionId;

/// Fixed-capacity page cache layered on the lock manager and the heap files.
///
/// Every page handed out has been locked for the requesting transaction
/// first. Only clean pages nobody is guarding are evicted, and eviction
/// never writes, so uncommitted changes never reach disk through it.
pub struct BufferPool {
    /// Page cache, least recently used first when iterated in reverse
    cache: Mutex<LruCache<PageId, PageRef>>,
    capacity: usize,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    lock_timeout: Duration,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, capacity: usize, lock_timeout: Duration) -> BufferResult<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or(BufferError::InvalidCapacity)?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(cap)),
            capacity,
            lock_manager: LockManager::new(),
            catalog,
            lock_timeout,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<PageId, PageRef>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file(&self, table_id: TableId) -> BufferResult<Arc<HeapFile>> {
        self.catalog
            .file(table_id)
            .map_err(|_| BufferError::TableNotFound(table_id))
    }

    /// Lock `page_id` for `tid` and return the cached page, reading it from
    /// disk on a miss.
    ///
    /// If the lock cannot be taken within the configured timeout the
    /// transaction is aborted here and `TransactionAborted` is returned.
    pub fn fetch_page(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> BufferResult<PageRef> {
        if let Err(source) = self
            .lock_manager
            .acquire(tid, page_id, mode, self.lock_timeout)
        {
            if let Err(e) = self.transaction_complete(tid, false) {
                tracing::warn!(%tid, error = %e, "abort after lock timeout failed");
            }
            return Err(BufferError::TransactionAborted { tid, source });
        }

        let mut cache = self.cache();
        if let Some(page) = cache.get(&page_id) {
            return Ok(Arc::clone(page));
        }

        let page = self.file(page_id.table_id)?.read_page(page_id)?;
        if cache.len() >= self.capacity {
            self.evict_locked(&mut cache)?;
        }

        let page = Arc::new(RwLock::new(page));
        cache.put(page_id, Arc::clone(&page));
        Ok(page)
    }

    /// Drop the least recently used clean page
    pub fn evict(&self) -> BufferResult<()> {
        let mut cache = self.cache();
        self.evict_locked(&mut cache)
    }

    /// Pop the least recently used page that is clean and not guarded by
    /// anyone. The victim is checked and removed under one write guard, so
    /// no writer can dirty it in between, and no page lock is ever waited
    /// on while the cache is locked.
    fn evict_locked(&self, cache: &mut LruCache<PageId, PageRef>) -> BufferResult<()> {
        let candidates: Vec<(PageId, PageRef)> = cache
            .iter()
            .rev()
            .map(|(page_id, page)| (*page_id, Arc::clone(page)))
            .collect();

        for (page_id, page) in candidates {
            let Ok(guard) = page.try_write() else {
                continue;
            };
            if guard.dirty_owner().is_some() {
                continue;
            }
            cache.pop(&page_id);
            drop(guard);
            tracing::debug!(%page_id, "evicted page");
            return Ok(());
        }

        Err(BufferError::AllPagesDirty {
            capacity: self.capacity,
        })
    }

    /// Tag a cached page as dirtied by `tid`
    pub fn mark_dirty(&self, page_id: PageId, tid: TransactionId) -> BufferResult<()> {
        self.set_dirty(page_id, Some(tid))
    }

    pub fn clear_dirty(&self, page_id: PageId) -> BufferResult<()> {
        self.set_dirty(page_id, None)
    }

    fn set_dirty(&self, page_id: PageId, owner: Option<TransactionId>) -> BufferResult<()> {
        let page = self
            .cached(page_id)
            .ok_or(BufferError::PageNotCached(page_id))?;
        write_page(&page).mark_dirty(owner);
        Ok(())
    }

    fn cached(&self, page_id: PageId) -> Option<PageRef> {
        self.cache().peek(&page_id).cloned()
    }

    /// Handles to every cached page, taken so page locks can be acquired
    /// after the cache lock is released
    fn snapshot(&self) -> Vec<(PageId, PageRef)> {
        self.cache()
            .iter()
            .map(|(page_id, page)| (*page_id, Arc::clone(page)))
            .collect()
    }

    /// Write a dirty page back to its heap file; clean or absent pages are
    /// left alone.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<()> {
        match self.cached(page_id) {
            Some(page) => self.flush(&page),
            None => Ok(()),
        }
    }

    fn flush(&self, page: &PageRef) -> BufferResult<()> {
        let mut page = write_page(page);
        if page.dirty_owner().is_none() {
            return Ok(());
        }

        let page_id = page.id();
        self.file(page_id.table_id)?.write_page(&page)?;
        page.mark_dirty(None);
        page.set_before_image();
        tracing::trace!(%page_id, "flushed page");
        Ok(())
    }

    /// Flush every dirty page regardless of which transaction dirtied it.
    ///
    /// This writes uncommitted changes too; an abort afterwards cannot
    /// undo them.
    pub fn flush_all(&self) -> BufferResult<()> {
        for (_, page) in self.snapshot() {
            self.flush(&page)?;
        }
        Ok(())
    }

    /// Flush the pages dirtied by `tid`
    pub fn flush_pages(&self, tid: TransactionId) -> BufferResult<()> {
        for page in self.owned_by(tid) {
            self.flush(&page)?;
        }
        Ok(())
    }

    /// Replace every page dirtied by `tid` with a fresh copy from disk.
    /// The pages keep their place in the recency order.
    pub fn discard_pages(&self, tid: TransactionId) -> BufferResult<()> {
        for page in self.owned_by(tid) {
            let mut guard = write_page(&page);
            if guard.dirty_owner() != Some(tid) {
                continue;
            }
            let page_id = guard.id();
            let fresh = self.file(page_id.table_id)?.read_page(page_id)?;
            *guard = fresh;
        }
        Ok(())
    }

    fn owned_by(&self, tid: TransactionId) -> Vec<PageRef> {
        self.snapshot()
            .into_iter()
            .filter(|(_, page)| read_page(page).dirty_owner() == Some(tid))
            .map(|(_, page)| page)
            .collect()
    }

    /// Drop a page from the cache without flushing it
    pub fn remove_page(&self, page_id: PageId) {
        self.cache().pop(&page_id);
    }

    /// Insert `record` into table `table_id` on behalf of `tid`
    pub fn insert_record(&self, tid: TransactionId, table_id: TableId, record: Record) -> BufferResult<RecordId> {
        let file = self.file(table_id)?;
        let (rid, dirtied) = file.insert_record(self, tid, record)?;
        self.admit_dirty(tid, dirtied)?;
        Ok(rid)
    }

    /// Delete `record` from the page its location names.
    ///
    /// A location that does not name an existing page of a registered table
    /// fails with `RecordNotFound`, as does an empty or mismatching slot. A
    /// record that was never placed has no location at all and fails with
    /// `Unplaced`.
    pub fn delete_record(&self, tid: TransactionId, record: &Record) -> BufferResult<()> {
        let rid = record.location()?;
        let file = self
            .file(rid.page_id.table_id)
            .map_err(|_| RecordError::RecordNotFound {
                page_id: rid.page_id,
                detail: format!("{} is not registered", rid.page_id.table_id),
            })?;
        let dirtied = file.delete_record(self, tid, record)?;
        self.admit_dirty(tid, dirtied)
    }

    /// Tag pages modified by `tid` and make sure they are cached, in case
    /// they were evicted between the fetch and the modification.
    fn admit_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> BufferResult<()> {
        for page in pages {
            let page_id = {
                let mut guard = write_page(&page);
                guard.mark_dirty(Some(tid));
                guard.id()
            };

            let mut cache = self.cache();
            if cache.get(&page_id).is_some_and(|cached| Arc::ptr_eq(cached, &page)) {
                continue;
            }
            if !cache.contains(&page_id) && cache.len() >= self.capacity {
                self.evict_locked(&mut cache)?;
            }
            cache.put(page_id, page);
            tracing::debug!(%page_id, %tid, "re-admitted dirty page");
        }
        Ok(())
    }

    /// Finish `tid`: on commit flush its pages, otherwise reload them from
    /// disk. Its locks are released either way.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> BufferResult<()> {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            self.discard_pages(tid)
        };
        self.lock_manager.release_all(tid);
        tracing::debug!(%tid, commit, ok = result.is_ok(), "transaction complete");
        result
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(tid, page_id)
    }

    /// Release one lock before the transaction ends.
    ///
    /// This breaks two-phase locking; callers must know the page was not
    /// modified.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release(tid, page_id);
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.cache().contains(&page_id)
    }

    /// Cached pages, most recently used first
    pub fn cached_pages(&self) -> Vec<PageId> {
        self.cache().iter().map(|(page_id, _)| *page_id).collect()
    }

    /// Cached dirty pages with the transaction that dirtied each
    pub fn dirty_pages(&self) -> Vec<(PageId, TransactionId)> {
        self.snapshot()
            .into_iter()
            .filter_map(|(page_id, page)| read_page(&page).dirty_owner().map(|tid| (page_id, tid)))
            .collect()
    }
}

fn read_page(page: &PageRef) -> std::sync::RwLockReadGuard<'_, Page> {
    page.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_page(page: &PageRef) -> std::sync::RwLockWriteGuard<'_, Page> {
    page.write().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("cached", &self.cache().len())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DEFAULT_PAGE_SIZE;
    use crate::record::{Field, Schema, Type};
    use tempfile::TempDir;

    const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE;
    const TIMEOUT: Duration = Duration::from_millis(100);

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_types(&[Type::Int, Type::Int, Type::Int]).unwrap())
    }

    fn record(schema: &Arc<Schema>, v: i32) -> Record {
        Record::new(
            Arc::clone(schema),
            vec![Field::Int(v), Field::Int(v + 1), Field::Int(v + 2)],
        )
        .unwrap()
    }

    /// A pool over one table of `pages` empty pages
    fn setup(capacity: usize, pages: u32) -> (TempDir, BufferPool, TableId) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = HeapFile::open(temp_dir.path().join("t.dat"), schema(), PAGE_SIZE).unwrap();
        for _ in 0..pages {
            file.append_empty_page().unwrap();
        }
        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.add_table(file, "t", None);
        let pool = BufferPool::new(catalog, capacity, TIMEOUT).unwrap();
        (temp_dir, pool, table_id)
    }

    fn page(table_id: TableId, page_no: u32) -> PageId {
        PageId::new(table_id, page_no)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BufferPool::new(Arc::new(Catalog::new()), 0, TIMEOUT);
        assert!(matches!(result, Err(BufferError::InvalidCapacity)));
    }

    #[test]
    fn test_lru_eviction_order() {
        let (_temp_dir, pool, table) = setup(2, 3);
        let tid = TransactionId(1);
        let (a, b, c) = (page(table, 0), page(table, 1), page(table, 2));

        pool.fetch_page(tid, a, LockMode::Shared).unwrap();
        pool.fetch_page(tid, b, LockMode::Shared).unwrap();
        pool.fetch_page(tid, a, LockMode::Shared).unwrap();
        assert_eq!(pool.cached_pages(), vec![a, b]);

        pool.fetch_page(tid, c, LockMode::Shared).unwrap();
        assert!(pool.is_cached(a));
        assert!(!pool.is_cached(b));
        assert!(pool.is_cached(c));
    }

    #[test]
    fn test_fetch_hit_returns_same_page() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        let first = pool.fetch_page(tid, page(table, 0), LockMode::Shared).unwrap();
        let second = pool.fetch_page(tid, page(table, 0), LockMode::Shared).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_fetch_missing_page() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let result = pool.fetch_page(TransactionId(1), page(table, 7), LockMode::Shared);
        assert!(matches!(result, Err(BufferError::File(_))));
    }

    #[test]
    fn test_fetch_unknown_table() {
        let (_temp_dir, pool, _) = setup(2, 1);
        let result = pool.fetch_page(TransactionId(1), page(TableId(99), 0), LockMode::Shared);
        assert!(matches!(result, Err(BufferError::TableNotFound(TableId(99)))));
    }

    #[test]
    fn test_eviction_skips_dirty_pages() {
        let (_temp_dir, pool, table) = setup(2, 3);
        let tid = TransactionId(1);
        let (a, b, c) = (page(table, 0), page(table, 1), page(table, 2));

        pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.fetch_page(tid, b, LockMode::Shared).unwrap();
        pool.mark_dirty(a, tid).unwrap();

        // a is least recently used but dirty, so b goes
        pool.fetch_page(tid, c, LockMode::Shared).unwrap();
        assert!(pool.is_cached(a));
        assert!(!pool.is_cached(b));
        assert_eq!(pool.dirty_pages(), vec![(a, tid)]);
    }

    #[test]
    fn test_all_pages_dirty() {
        let (_temp_dir, pool, table) = setup(2, 3);
        let tid = TransactionId(1);
        let (a, b, c) = (page(table, 0), page(table, 1), page(table, 2));

        pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.fetch_page(tid, b, LockMode::Exclusive).unwrap();
        pool.mark_dirty(a, tid).unwrap();
        pool.mark_dirty(b, tid).unwrap();

        let result = pool.fetch_page(tid, c, LockMode::Shared);
        assert!(matches!(result, Err(BufferError::AllPagesDirty { capacity: 2 })));
        assert_eq!(pool.cached_pages().len(), 2);
        assert!(!pool.is_cached(c));
    }

    #[test]
    fn test_explicit_evict_and_clear_dirty() {
        let (_temp_dir, pool, table) = setup(2, 2);
        let tid = TransactionId(1);
        let (a, b) = (page(table, 0), page(table, 1));
        assert_eq!(pool.capacity(), 2);

        pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.fetch_page(tid, b, LockMode::Shared).unwrap();
        pool.mark_dirty(a, tid).unwrap();

        pool.evict().unwrap();
        assert_eq!(pool.cached_pages(), vec![a]);
        assert!(matches!(pool.evict(), Err(BufferError::AllPagesDirty { .. })));

        pool.clear_dirty(a).unwrap();
        pool.evict().unwrap();
        assert!(pool.cached_pages().is_empty());
    }

    #[test]
    fn test_mark_dirty_uncached() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let result = pool.mark_dirty(page(table, 0), TransactionId(1));
        assert!(matches!(result, Err(BufferError::PageNotCached(_))));
    }

    #[test]
    fn test_flush_page_writes_and_cleans() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        let schema = schema();
        let rid = pool.insert_record(tid, table, record(&schema, 10)).unwrap();
        assert_eq!(pool.dirty_pages(), vec![(rid.page_id, tid)]);

        pool.flush_page(rid.page_id).unwrap();
        assert!(pool.dirty_pages().is_empty());

        let on_disk = pool.file(table).unwrap().read_page(rid.page_id).unwrap();
        let heap = on_disk.as_heap().unwrap();
        assert_eq!(heap.record(rid.slot_id), Some(&record(&schema, 10)));

        // The flushed contents are now the before-image
        let cached = pool.fetch_page(tid, rid.page_id, LockMode::Shared).unwrap();
        let cached = cached.read().unwrap();
        assert_eq!(cached.before_image(), cached.page_data().as_slice());
    }

    #[test]
    fn test_flush_clean_page_is_noop() {
        let (_temp_dir, pool, table) = setup(2, 1);
        pool.flush_page(page(table, 0)).unwrap();
        pool.fetch_page(TransactionId(1), page(table, 0), LockMode::Shared)
            .unwrap();
        pool.flush_page(page(table, 0)).unwrap();
    }

    #[test]
    fn test_discard_reloads_from_disk() {
        let (_temp_dir, pool, table) = setup(3, 2);
        let tid = TransactionId(1);
        let schema = schema();

        pool.fetch_page(tid, page(table, 1), LockMode::Shared).unwrap();
        let rid = pool.insert_record(tid, table, record(&schema, 1)).unwrap();
        assert_eq!(rid.page_id, page(table, 0));
        let order = pool.cached_pages();

        pool.discard_pages(tid).unwrap();
        assert!(pool.dirty_pages().is_empty());
        assert_eq!(pool.cached_pages(), order);

        let page = pool.fetch_page(tid, rid.page_id, LockMode::Shared).unwrap();
        assert_eq!(page.read().unwrap().as_heap().unwrap().records().count(), 0);
    }

    #[test]
    fn test_transaction_complete_releases_locks() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        pool.fetch_page(tid, page(table, 0), LockMode::Exclusive)
            .unwrap();
        assert!(pool.holds_lock(tid, page(table, 0)));

        pool.transaction_complete(tid, true).unwrap();
        assert!(!pool.holds_lock(tid, page(table, 0)));
    }

    #[test]
    fn test_release_page() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        pool.fetch_page(tid, page(table, 0), LockMode::Shared).unwrap();
        pool.release_page(tid, page(table, 0));
        assert!(!pool.holds_lock(tid, page(table, 0)));
        assert!(pool.is_cached(page(table, 0)));
    }

    #[test]
    fn test_lock_timeout_aborts() {
        let (_temp_dir, pool, table) = setup(2, 2);
        let (t1, t2) = (TransactionId(1), TransactionId(2));
        let schema = schema();

        let rid = pool.insert_record(t2, table, record(&schema, 5)).unwrap();
        pool.fetch_page(t2, page(table, 1), LockMode::Shared).unwrap();

        pool.fetch_page(t1, rid.page_id, LockMode::Shared).unwrap_err();
        pool.fetch_page(t1, page(table, 1), LockMode::Exclusive)
            .unwrap_err();

        // t2 is untouched by t1's aborts
        assert!(pool.holds_lock(t2, rid.page_id));
        assert_eq!(pool.dirty_pages(), vec![(rid.page_id, t2)]);
    }

    #[test]
    fn test_timeout_error_is_transaction_aborted() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let (t1, t2) = (TransactionId(1), TransactionId(2));

        pool.fetch_page(t1, page(table, 0), LockMode::Exclusive)
            .unwrap();
        let result = pool.fetch_page(t2, page(table, 0), LockMode::Shared);
        assert!(matches!(
            result,
            Err(BufferError::TransactionAborted { tid, .. }) if tid == t2
        ));
        assert!(!pool.holds_lock(t2, page(table, 0)));
        assert!(pool.holds_lock(t1, page(table, 0)));
    }

    #[test]
    fn test_remove_page() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        let rid = pool
            .insert_record(tid, table, record(&schema(), 3))
            .unwrap();
        pool.remove_page(rid.page_id);
        assert!(!pool.is_cached(rid.page_id));

        // Removal does not flush
        let on_disk = pool.file(table).unwrap().read_page(rid.page_id).unwrap();
        assert_eq!(on_disk.as_heap().unwrap().records().count(), 0);
    }

    #[test]
    fn test_delete_unplaced_record() {
        let (_temp_dir, pool, _) = setup(2, 1);
        let result = pool.delete_record(TransactionId(1), &record(&schema(), 1));
        assert!(matches!(result, Err(BufferError::Record(RecordError::Unplaced(_)))));
    }

    #[test]
    fn test_delete_stale_locations_are_not_found() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        let mut rec = record(&schema(), 1);

        for page_id in [page(TableId(99), 0), page(table, 4)] {
            rec.set_record_id(Some(RecordId::new(page_id, 0)));
            let result = pool.delete_record(tid, &rec);
            assert!(matches!(
                result,
                Err(BufferError::Record(RecordError::RecordNotFound { page_id: missing, .. })) if missing == page_id
            ));
            assert!(!pool.holds_lock(tid, page_id));
        }

        rec.set_record_id(Some(RecordId::new(page(table, 0), 0)));
        let result = pool.delete_record(tid, &rec);
        assert!(matches!(
            result,
            Err(BufferError::Record(RecordError::RecordNotFound { .. }))
        ));
    }

    #[test]
    fn test_eviction_skips_guarded_page() {
        let (_temp_dir, pool, table) = setup(1, 2);
        let (t1, t2) = (TransactionId(1), TransactionId(2));
        let (a, b) = (page(table, 0), page(table, 1));

        let held = pool.fetch_page(t1, a, LockMode::Exclusive).unwrap();
        let guard = held.read().unwrap();
        assert!(matches!(pool.evict(), Err(BufferError::AllPagesDirty { capacity: 1 })));
        let result = pool.fetch_page(t2, b, LockMode::Shared);
        assert!(matches!(result, Err(BufferError::AllPagesDirty { capacity: 1 })));
        assert_eq!(pool.cached_pages(), vec![a]);

        drop(guard);
        pool.fetch_page(t2, b, LockMode::Shared).unwrap();
        assert_eq!(pool.cached_pages(), vec![b]);
    }

    #[test]
    fn test_concurrent_eviction_cannot_leak_aborted_insert() {
        let (_temp_dir, pool, table) = setup(1, 2);
        let (t1, t2) = (TransactionId(1), TransactionId(2));
        let (a, b) = (page(table, 0), page(table, 1));
        let schema = schema();

        let held = pool.fetch_page(t1, a, LockMode::Exclusive).unwrap();
        let reader = held.read().unwrap();
        std::thread::scope(|s| {
            let result = s
                .spawn(|| pool.fetch_page(t2, b, LockMode::Shared))
                .join()
                .unwrap();
            assert!(matches!(result, Err(BufferError::AllPagesDirty { .. })));
        });
        drop(reader);

        {
            let mut guard = held.write().unwrap();
            guard.as_heap_mut().unwrap().insert_record(record(&schema, 7)).unwrap();
            guard.mark_dirty(Some(t1));
        }
        pool.transaction_complete(t1, false).unwrap();

        let on_disk = pool.file(table).unwrap().read_page(a).unwrap();
        assert_eq!(on_disk.as_heap().unwrap().records().count(), 0);
        assert_eq!(held.read().unwrap().as_heap().unwrap().records().count(), 0);
    }

    #[test]
    fn test_evicted_page_changes_never_reach_disk() {
        let (_temp_dir, pool, table) = setup(1, 2);
        let (t1, t2) = (TransactionId(1), TransactionId(2));
        let (a, b) = (page(table, 0), page(table, 1));

        let held = pool.fetch_page(t1, a, LockMode::Exclusive).unwrap();
        pool.fetch_page(t2, b, LockMode::Shared).unwrap();
        assert!(!pool.is_cached(a));

        {
            let mut guard = held.write().unwrap();
            guard.as_heap_mut().unwrap().insert_record(record(&schema(), 2)).unwrap();
            guard.mark_dirty(Some(t1));
        }
        pool.transaction_complete(t1, false).unwrap();

        let on_disk = pool.file(table).unwrap().read_page(a).unwrap();
        assert_eq!(on_disk.as_heap().unwrap().records().count(), 0);
    }

    #[test]
    fn test_admit_dirty_readmits_evicted_page() {
        let (_temp_dir, pool, table) = setup(2, 2);
        let tid = TransactionId(1);
        let a = page(table, 0);
        let schema = schema();

        let held = pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.remove_page(a);
        assert!(!pool.is_cached(a));

        let rid = held
            .write()
            .unwrap()
            .as_heap_mut()
            .unwrap()
            .insert_record(record(&schema, 4))
            .unwrap();
        pool.admit_dirty(tid, vec![Arc::clone(&held)]).unwrap();

        assert!(pool.is_cached(a));
        assert_eq!(pool.dirty_pages(), vec![(a, tid)]);
        let cached = pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        assert!(Arc::ptr_eq(&cached, &held));

        pool.transaction_complete(tid, true).unwrap();
        let on_disk = pool.file(table).unwrap().read_page(a).unwrap();
        assert_eq!(on_disk.as_heap().unwrap().record(rid.slot_id), Some(&record(&schema, 4)));
    }

    #[test]
    fn test_admit_dirty_replaces_stale_copy() {
        let (_temp_dir, pool, table) = setup(2, 1);
        let tid = TransactionId(1);
        let a = page(table, 0);

        let held = pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.remove_page(a);
        let stale = pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        assert!(!Arc::ptr_eq(&stale, &held));

        held.write()
            .unwrap()
            .as_heap_mut()
            .unwrap()
            .insert_record(record(&schema(), 8))
            .unwrap();
        pool.admit_dirty(tid, vec![Arc::clone(&held)]).unwrap();

        let cached = pool.fetch_page(tid, a, LockMode::Shared).unwrap();
        assert!(Arc::ptr_eq(&cached, &held));
        assert_eq!(pool.cached_pages(), vec![a]);
        assert_eq!(pool.dirty_pages(), vec![(a, tid)]);
    }

    #[test]
    fn test_admit_dirty_fails_when_cache_is_all_dirty() {
        let (_temp_dir, pool, table) = setup(1, 2);
        let tid = TransactionId(1);
        let (a, b) = (page(table, 0), page(table, 1));

        let held = pool.fetch_page(tid, a, LockMode::Exclusive).unwrap();
        pool.remove_page(a);
        pool.fetch_page(tid, b, LockMode::Exclusive).unwrap();
        pool.mark_dirty(b, tid).unwrap();

        let result = pool.admit_dirty(tid, vec![Arc::clone(&held)]);
        assert!(matches!(result, Err(BufferError::AllPagesDirty { capacity: 1 })));
        assert!(!pool.is_cached(a));
        assert_eq!(pool.dirty_pages(), vec![(b, tid)]);
        assert_eq!(held.read().unwrap().dirty_owner(), Some(tid));
    }
}
