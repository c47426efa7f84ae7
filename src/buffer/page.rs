use std::sync::{Arc, RwLock};

use crate::record::{HeapPage, PageId};
use crate::transaction::TransactionId;

/// A cached page shared between the buffer pool and its callers.
///
/// Callers must release the guard before calling back into the pool.
pub type PageRef = Arc<RwLock<Page>>;

/// Every kind of page the buffer pool can cache
#[derive(Debug, Clone)]
pub enum Page {
    Heap(HeapPage),
}

impl Page {
    pub fn id(&self) -> PageId {
        match self {
            Page::Heap(page) => page.id(),
        }
    }

    /// Encoded bytes, exactly one page long
    pub fn page_data(&self) -> Vec<u8> {
        match self {
            Page::Heap(page) => page.page_data(),
        }
    }

    pub fn dirty_owner(&self) -> Option<TransactionId> {
        match self {
            Page::Heap(page) => page.dirty_owner(),
        }
    }

    pub fn mark_dirty(&mut self, owner: Option<TransactionId>) {
        match self {
            Page::Heap(page) => page.mark_dirty(owner),
        }
    }

    pub fn before_image(&self) -> &[u8] {
        match self {
            Page::Heap(page) => page.before_image(),
        }
    }

    pub fn set_before_image(&mut self) {
        match self {
            Page::Heap(page) => page.set_before_image(),
        }
    }

    pub fn as_heap(&self) -> Option<&HeapPage> {
        match self {
            Page::Heap(page) => Some(page),
        }
    }

    pub fn as_heap_mut(&mut self) -> Option<&mut HeapPage> {
        match self {
            Page::Heap(page) => Some(page),
        }
    }
}

impl From<HeapPage> for Page {
    fn from(page: HeapPage) -> Self {
        Page::Heap(page)
    }
}
