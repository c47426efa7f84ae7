use std::sync::{Arc, PoisonError};

use super::heap_file::HeapFile;
use crate::buffer::{BufferPool, BufferResult};
use crate::file::PageNo;
use crate::lock::LockMode;
use crate::record::{PageId, Record, SlotId};
use crate::transaction::TransactionId;

/// Forward scan over every record of a heap file, in page then slot order.
///
/// Each page is fetched through the buffer pool with a shared lock. The
/// number of pages is fixed when the scan is opened, so pages appended
/// later are not visited.
pub struct HeapScan<'a> {
    pool: &'a BufferPool,
    file: Arc<HeapFile>,
    tid: TransactionId,
    page_count: PageNo,
    page_no: PageNo,
    slot_id: SlotId,
    done: bool,
}

impl<'a> HeapScan<'a> {
    pub(crate) fn open(pool: &'a BufferPool, file: Arc<HeapFile>, tid: TransactionId) -> BufferResult<Self> {
        let page_count = file.num_pages()?;
        Ok(Self {
            pool,
            file,
            tid,
            page_count,
            page_no: 0,
            slot_id: 0,
            done: false,
        })
    }

    /// Start again from the first record
    pub fn rewind(&mut self) {
        self.page_no = 0;
        self.slot_id = 0;
        self.done = false;
    }

    /// Next occupied record at or after the cursor on the current page
    fn next_on_page(&mut self) -> BufferResult<Option<Record>> {
        let page_id = PageId::new(self.file.table_id(), self.page_no);
        let page = self.pool.fetch_page(self.tid, page_id, LockMode::Shared)?;
        let page = page.read().unwrap_or_else(PoisonError::into_inner);
        let Some(heap) = page.as_heap() else {
            return Ok(None);
        };

        for slot_id in self.slot_id..heap.num_slots() {
            if let Some(record) = heap.record(slot_id) {
                self.slot_id = slot_id + 1;
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = BufferResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.page_no >= self.page_count {
                self.done = true;
                return None;
            }

            match self.next_on_page() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.page_no += 1;
                    self.slot_id = 0;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::fmt::Debug for HeapScan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapScan")
            .field("table_id", &self.file.table_id())
            .field("tid", &self.tid)
            .field("page_no", &self.page_no)
            .field("slot_id", &self.slot_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::file::DEFAULT_PAGE_SIZE;
    use crate::record::{Field, HeapPage, Schema, Type};
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BufferPool, Arc<HeapFile>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let schema = Arc::new(Schema::from_types(&[Type::Int, Type::Str]).unwrap());
        let file = HeapFile::open(temp_dir.path().join("s.dat"), schema, DEFAULT_PAGE_SIZE).unwrap();
        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.add_table(file, "s", None);
        let file = catalog.file(table_id).unwrap();
        let pool = BufferPool::new(catalog, 4, Duration::from_millis(100)).unwrap();
        (temp_dir, pool, file)
    }

    fn record(file: &HeapFile, v: i32) -> Record {
        Record::new(
            Arc::clone(file.schema()),
            vec![Field::Int(v), Field::string(format!("row{}", v)).unwrap()],
        )
        .unwrap()
    }

    fn values(scan: HeapScan<'_>) -> Vec<i32> {
        scan.map(|r| match r.unwrap().field(0) {
            Some(Field::Int(v)) => *v,
            other => panic!("unexpected field {:?}", other),
        })
        .collect()
    }

    #[test]
    fn test_scan_empty_file() {
        let (_temp_dir, pool, file) = setup();
        let scan = file.scan(&pool, TransactionId(1)).unwrap();
        assert_eq!(scan.count(), 0);
    }

    #[test]
    fn test_scan_across_pages_in_order() {
        let (_temp_dir, pool, file) = setup();
        let tid = TransactionId(1);
        let per_page = HeapPage::max_records(DEFAULT_PAGE_SIZE, file.schema()) as i32;
        let total = per_page * 2 + 3;
        for v in 0..total {
            pool.insert_record(tid, file.table_id(), record(&file, v))
                .unwrap();
        }
        assert_eq!(file.num_pages().unwrap(), 3);

        let scan = file.scan(&pool, tid).unwrap();
        assert_eq!(values(scan), (0..total).collect::<Vec<_>>());
    }

    #[test]
    fn test_scan_skips_deleted_slots() {
        let (_temp_dir, pool, file) = setup();
        let tid = TransactionId(1);
        for v in 0..5 {
            pool.insert_record(tid, file.table_id(), record(&file, v))
                .unwrap();
        }

        let victim = file
            .scan(&pool, tid)
            .unwrap()
            .map(Result::unwrap)
            .find(|r| r.field(0) == Some(&Field::Int(2)))
            .unwrap();
        pool.delete_record(tid, &victim).unwrap();

        let scan = file.scan(&pool, tid).unwrap();
        assert_eq!(values(scan), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_rewind() {
        let (_temp_dir, pool, file) = setup();
        let tid = TransactionId(1);
        for v in 0..3 {
            pool.insert_record(tid, file.table_id(), record(&file, v))
                .unwrap();
        }

        let mut scan = file.scan(&pool, tid).unwrap();
        assert_eq!(scan.by_ref().count(), 3);
        assert!(scan.next().is_none());

        scan.rewind();
        assert_eq!(values(scan), vec![0, 1, 2]);
    }

    #[test]
    fn test_scan_bounded_at_open() {
        let (_temp_dir, pool, file) = setup();
        let tid = TransactionId(1);
        pool.insert_record(tid, file.table_id(), record(&file, 0))
            .unwrap();

        let scan = file.scan(&pool, tid).unwrap();
        file.append_empty_page().unwrap();
        assert_eq!(values(scan), vec![0]);
    }

    #[test]
    fn test_scan_takes_shared_locks() {
        let (_temp_dir, pool, file) = setup();
        let (writer, reader) = (TransactionId(1), TransactionId(2));
        pool.insert_record(writer, file.table_id(), record(&file, 0))
            .unwrap();
        pool.transaction_complete(writer, true).unwrap();

        let scan = file.scan(&pool, reader).unwrap();
        assert_eq!(values(scan), vec![0]);
        let page_id = PageId::new(file.table_id(), 0);
        assert_eq!(
            pool.lock_manager().lock_mode(reader, page_id),
            Some(LockMode::Shared)
        );
    }
}
