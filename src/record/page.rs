use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{PageId, Record, RecordId, SlotId};
use super::schema::Schema;
use crate::transaction::TransactionId;

/// A page of fixed-width records.
///
/// Layout: a slot-occupancy bitmap of `header_size` bytes (slot `i` lives at
/// byte `i / 8`, bit `i % 8`, least significant bit first), followed by
/// `num_slots` record slots of `schema.record_size()` bytes each, followed by
/// zero padding up to the page size. Empty slots are zero-filled so every
/// slot keeps a static offset.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    records: Vec<Option<Record>>,
    dirty: Option<TransactionId>,
    before_image: Arc<[u8]>,
}

impl HeapPage {
    /// Maximum number of records a page of `page_size` bytes can hold:
    /// every slot costs its record width plus one header bit.
    pub fn max_records(page_size: usize, schema: &Schema) -> usize {
        (page_size * 8) / (schema.record_size() * 8 + 1)
    }

    /// Number of bitmap bytes at the start of the page
    pub fn header_size(page_size: usize, schema: &Schema) -> usize {
        Self::max_records(page_size, schema).div_ceil(8)
    }

    /// Bytes of a page with no records in it
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Decode a page from exactly `page_size` bytes
    pub fn new(pid: PageId, schema: Arc<Schema>, page_size: usize, data: &[u8]) -> RecordResult<Self> {
        if data.len() != page_size {
            return Err(RecordError::Deserialization(format!(
                "Expected {} page bytes, got {}",
                page_size,
                data.len()
            )));
        }

        let num_slots = Self::max_records(page_size, &schema);
        if num_slots == 0 {
            return Err(RecordError::PageTooSmall {
                page_size,
                record_size: schema.record_size(),
            });
        }

        let header_size = num_slots.div_ceil(8);
        let header = data[..header_size].to_vec();
        let record_size = schema.record_size();

        let mut records = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if !bit_is_set(&header, slot) {
                records.push(None);
                continue;
            }
            let start = header_size + slot * record_size;
            let mut record = Record::deserialize(&data[start..start + record_size], &schema)?;
            record.set_record_id(Some(RecordId::new(pid, slot)));
            records.push(Some(record));
        }

        Ok(Self {
            pid,
            schema,
            page_size,
            header,
            records,
            dirty: None,
            before_image: Arc::from(data),
        })
    }

    /// A fresh page with every slot free
    pub fn empty(pid: PageId, schema: Arc<Schema>, page_size: usize) -> RecordResult<Self> {
        Self::new(pid, schema, page_size, &Self::empty_page_data(page_size))
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of record slots on this page
    pub fn num_slots(&self) -> usize {
        self.records.len()
    }

    /// Encode this page; the inverse of [`HeapPage::new`]
    pub fn page_data(&self) -> Vec<u8> {
        let record_size = self.schema.record_size();
        let mut out = Vec::with_capacity(self.page_size);
        out.extend_from_slice(&self.header);

        for record in &self.records {
            match record {
                Some(record) => record.serialize_into(&mut out),
                None => out.resize(out.len() + record_size, 0),
            }
        }

        out.resize(self.page_size, 0);
        out
    }

    /// Snapshot of the page bytes as of decode time or the last checkpoint
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Decode the before-image into a page of its own
    pub fn before_image_page(&self) -> RecordResult<HeapPage> {
        HeapPage::new(
            self.pid,
            Arc::clone(&self.schema),
            self.page_size,
            &self.before_image,
        )
    }

    /// Make the current contents the new before-image
    pub fn set_before_image(&mut self) {
        self.before_image = Arc::from(self.page_data());
    }

    /// Store `record` in the lowest free slot
    pub fn insert_record(&mut self, mut record: Record) -> RecordResult<RecordId> {
        if **record.schema() != *self.schema {
            return Err(RecordError::SchemaMismatch(format!(
                "Record schema [{}] does not match page schema [{}]",
                record.schema(),
                self.schema
            )));
        }

        let slot = self
            .find_free_slot()
            .ok_or(RecordError::PageFull(self.pid))?;

        let rid = RecordId::new(self.pid, slot);
        record.set_record_id(Some(rid));
        set_bit(&mut self.header, slot, true);
        self.records[slot] = Some(record);
        Ok(rid)
    }

    /// Clear the slot holding `record`. Other slots are left in place.
    pub fn delete_record(&mut self, record: &Record) -> RecordResult<()> {
        let rid = record.record_id().ok_or_else(|| RecordError::RecordNotFound {
            page_id: self.pid,
            detail: "record has no location".to_string(),
        })?;

        if rid.page_id != self.pid {
            return Err(RecordError::RecordNotFound {
                page_id: self.pid,
                detail: format!("record lives on {}", rid.page_id),
            });
        }

        match self.records.get(rid.slot_id) {
            Some(Some(stored)) if stored == record => {}
            Some(Some(_)) => {
                return Err(RecordError::RecordNotFound {
                    page_id: self.pid,
                    detail: format!("slot {} holds a different record", rid.slot_id),
                });
            }
            Some(None) => {
                return Err(RecordError::RecordNotFound {
                    page_id: self.pid,
                    detail: format!("slot {} is empty", rid.slot_id),
                });
            }
            None => {
                return Err(RecordError::RecordNotFound {
                    page_id: self.pid,
                    detail: format!("slot {} out of range", rid.slot_id),
                });
            }
        }

        set_bit(&mut self.header, rid.slot_id, false);
        self.records[rid.slot_id] = None;
        Ok(())
    }

    /// Set or clear the transaction that dirtied this page
    pub fn mark_dirty(&mut self, owner: Option<TransactionId>) {
        self.dirty = owner;
    }

    /// Transaction that last dirtied this page, if it is dirty
    pub fn dirty_owner(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        slot < self.num_slots() && bit_is_set(&self.header, slot)
    }

    fn find_free_slot(&self) -> Option<SlotId> {
        (0..self.num_slots()).find(|&slot| !self.is_slot_used(slot))
    }

    /// Record stored in `slot`, if occupied
    pub fn record(&self, slot: SlotId) -> Option<&Record> {
        self.records.get(slot).and_then(Option::as_ref)
    }

    /// Occupied records in slot order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter_map(Option::as_ref)
    }
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    (bitmap[idx / 8] >> (idx % 8)) & 1 == 1
}

fn set_bit(bitmap: &mut [u8], idx: usize, value: bool) {
    let mask = 1u8 << (idx % 8);
    if value {
        bitmap[idx / 8] |= mask;
    } else {
        bitmap[idx / 8] &= !mask;
    }
}
