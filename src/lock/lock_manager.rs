//! Page-granularity two-phase locking.

use ahash::{AHashMap, AHashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::record::PageId;
use crate::transaction::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{tid} timed out after {waited:?} waiting for {mode:?} lock on {page_id}")]
    Timeout {
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
        waited: Duration,
    },
}

pub type LockResult<T> = Result<T, LockError>;

/// Holders of one page. Shared and exclusive never coexist.
#[derive(Debug)]
enum PageLock {
    Shared(AHashSet<TransactionId>),
    Exclusive(TransactionId),
}

impl PageLock {
    fn holds(&self, tid: TransactionId) -> bool {
        match self {
            PageLock::Shared(holders) => holders.contains(&tid),
            PageLock::Exclusive(holder) => *holder == tid,
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    pages: AHashMap<PageId, PageLock>,
    /// Reverse index so a transaction can drop everything it holds
    held: AHashMap<TransactionId, AHashSet<PageId>>,
}

impl LockTable {
    /// One grant attempt. Returns false when the request conflicts.
    fn try_grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        let granted = match self.pages.get_mut(&page_id) {
            None => {
                let lock = match mode {
                    LockMode::Shared => PageLock::Shared([tid].into_iter().collect()),
                    LockMode::Exclusive => PageLock::Exclusive(tid),
                };
                self.pages.insert(page_id, lock);
                true
            }
            // Exclusive already covers both modes for its holder
            Some(PageLock::Exclusive(holder)) => *holder == tid,
            Some(PageLock::Shared(holders)) => match mode {
                LockMode::Shared => {
                    holders.insert(tid);
                    true
                }
                // Upgrade only when the requester is the sole reader
                LockMode::Exclusive => holders.len() == 1 && holders.contains(&tid),
            },
        };

        if granted && mode == LockMode::Exclusive {
            self.pages.insert(page_id, PageLock::Exclusive(tid));
        }
        if granted {
            self.held.entry(tid).or_default().insert(page_id);
        }
        granted
    }

    /// Remove `tid` from the holders of `page_id` without touching `held`
    fn drop_holder(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        let now_empty = match self.pages.get_mut(&page_id) {
            Some(PageLock::Shared(holders)) => {
                if !holders.remove(&tid) {
                    return false;
                }
                holders.is_empty()
            }
            Some(PageLock::Exclusive(holder)) if *holder == tid => true,
            _ => return false,
        };

        if now_empty {
            self.pages.remove(&page_id);
        }
        true
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        if !self.drop_holder(tid, page_id) {
            return false;
        }
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        true
    }
}

/// Table of shared/exclusive page locks.
///
/// Every call runs inside one critical section on the table. Waiters sleep on
/// a condition variable that is signalled whenever locks are released, and
/// give up once their timeout has elapsed. There is no deadlock detection: a
/// cycle of waiters is broken by one of them timing out.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Single non-blocking attempt to take a lock
    pub fn try_acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        self.table().try_grant(tid, page_id, mode)
    }

    /// Take a lock, waiting up to `timeout` for conflicting holders to leave
    pub fn acquire(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
        timeout: Duration,
    ) -> LockResult<()> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut table = self.table();
        let mut waited = false;

        loop {
            if table.try_grant(tid, page_id, mode) {
                if waited {
                    tracing::trace!(%tid, %page_id, ?mode, waited = ?start.elapsed(), "lock granted after wait");
                }
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(%tid, %page_id, ?mode, "lock wait timed out");
                return Err(LockError::Timeout {
                    tid,
                    page_id,
                    mode,
                    waited: start.elapsed(),
                });
            }

            let (guard, _) = self
                .released
                .wait_timeout(table, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            table = guard;
            waited = true;
        }
    }

    /// Release one lock held by `tid`
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        if self.table().release(tid, page_id) {
            self.released.notify_all();
        }
    }

    /// Release every lock held by `tid`
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table();
        let pages = table.held.remove(&tid).unwrap_or_default();
        if pages.is_empty() {
            return;
        }
        for page_id in pages {
            table.drop_holder(tid, page_id);
        }
        drop(table);
        self.released.notify_all();
    }

    /// Whether `tid` holds any lock on `page_id`
    pub fn holds(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.table()
            .pages
            .get(&page_id)
            .is_some_and(|lock| lock.holds(tid))
    }

    /// Mode in which `tid` holds `page_id`, if at all
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        match self.table().pages.get(&page_id)? {
            PageLock::Shared(holders) if holders.contains(&tid) => Some(LockMode::Shared),
            PageLock::Exclusive(holder) if *holder == tid => Some(LockMode::Exclusive),
            _ => None,
        }
    }

    /// Pages on which `tid` currently holds a lock
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
