use std::fmt;
use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::schema::Schema;
use super::value::Field;
use crate::file::PageNo;

/// Identifier of a table, assigned by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Identifies a page uniquely within the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/page#{}", self.table_id, self.page_no)
    }
}

/// Slot identifier within a page
pub type SlotId = usize;

/// Physical identifier for a record (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

/// A single record with typed values.
///
/// Equality compares schema and values; the storage location is ignored.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Record {
    /// Create a new record, validating it against `schema`
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> RecordResult<Self> {
        schema.validate(&fields)?;
        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    /// Storage location, if the record has been placed on a page
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Storage location, failing for records that were never placed
    pub fn location(&self) -> RecordResult<RecordId> {
        self.record_id
            .ok_or_else(|| RecordError::Unplaced(self.to_string()))
    }

    /// Append the fixed-width encoding of this record to `out`
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            field.serialize_into(out);
        }
    }

    /// Decode a record from exactly `schema.record_size()` bytes
    pub fn deserialize(data: &[u8], schema: &Arc<Schema>) -> RecordResult<Self> {
        if data.len() != schema.record_size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes, got {}",
                schema.record_size(),
                data.len()
            )));
        }

        let mut offset = 0;
        let mut fields = Vec::with_capacity(schema.num_fields());
        for def in schema.fields() {
            let size = def.size();
            fields.push(def.field_type.parse(&data[offset..offset + size])?);
            offset += size;
        }

        Ok(Self {
            schema: Arc::clone(schema),
            fields,
            record_id: None,
        })
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
