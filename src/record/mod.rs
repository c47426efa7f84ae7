mod error;
mod page;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use page::HeapPage;
pub use record::{PageId, Record, RecordId, SlotId, TableId};
pub use schema::{FieldDef, Schema};
pub use value::{Field, STRING_LEN, Type};
