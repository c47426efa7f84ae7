//! Bulk conversion of delimited text into a heap file.

use csv::ReaderBuilder;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::file::{FileError, PagedFile};
use crate::record::{HeapPage, PageId, Record, RecordError, Schema, TableId, Type};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: expected {expected} fields, got {actual}")]
    FieldCount {
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Line {line}: {source}")]
    Field {
        line: u64,
        #[source]
        source: RecordError,
    },

    #[error("Output {0} already exists")]
    OutputExists(String),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Read comma separated records from `input` and write them, densely
/// packed, as a heap file at `output`. Returns the number of records
/// written.
///
/// Every line must have exactly one value per entry in `types`. An empty
/// input produces an empty file.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    page_size: usize,
    types: &[Type],
) -> EncodeResult<usize> {
    convert_with_delimiter(input, output, page_size, types, b',')
}

/// [`convert`] with a custom field delimiter
pub fn convert_with_delimiter<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    page_size: usize,
    types: &[Type],
    delimiter: u8,
) -> EncodeResult<usize> {
    let output = output.as_ref();
    let schema = Arc::new(Schema::from_types(types)?);
    if HeapPage::max_records(page_size, &schema) == 0 {
        return Err(RecordError::PageTooSmall {
            page_size,
            record_size: schema.record_size(),
        }
        .into());
    }
    if output.exists() && std::fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false) {
        return Err(EncodeError::OutputExists(output.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(input)?;

    let file = PagedFile::open(output, page_size)?;
    // The table id is never stored on disk
    let page_id = |page_no| PageId::new(TableId(0), page_no);
    let mut page_no = 0;
    let mut page = HeapPage::empty(page_id(page_no), Arc::clone(&schema), page_size)?;
    let mut written = 0;

    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        if row.len() == 1 && row.get(0).is_some_and(str::is_empty) {
            continue;
        }
        if row.len() != types.len() {
            return Err(EncodeError::FieldCount {
                line,
                expected: types.len(),
                actual: row.len(),
            });
        }

        let fields = types
            .iter()
            .zip(row.iter())
            .map(|(ty, text)| ty.parse_text(text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| EncodeError::Field { line, source })?;
        let record = Record::new(Arc::clone(&schema), fields)?;

        if page.num_empty_slots() == 0 {
            file.write_page(page_no, &page.page_data())?;
            page_no += 1;
            page = HeapPage::empty(page_id(page_no), Arc::clone(&schema), page_size)?;
        }
        page.insert_record(record)?;
        written += 1;
    }

    if written > 0 {
        file.write_page(page_no, &page.page_data())?;
    }
    file.sync()?;

    tracing::info!(output = %output.display(), records = written, pages = file.page_count()?, "converted");
    Ok(written)
}
