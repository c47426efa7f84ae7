use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::buffer::BufferError;
use crate::heap::HeapFile;
use crate::record::{FieldDef, RecordError, Schema, TableId, Type};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog entry on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Unknown type {ty:?} on line {line}")]
    UnknownType { line: usize, ty: String },

    #[error("Unknown annotation {annotation:?} on line {line}")]
    UnknownAnnotation { line: usize, annotation: String },

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Cannot open table file: {0}")]
    File(#[from] BufferError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// One table definition parsed from a schema file
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub schema: Schema,
    pub primary_key: Option<String>,
}

impl TableDef {
    /// Parse `name (field type [pk], field type, ...)`. `line` is only used
    /// in error messages.
    pub fn parse(text: &str, line: usize) -> CatalogResult<Self> {
        let parse_err = |reason: &str| CatalogError::Parse {
            line,
            reason: reason.to_string(),
        };

        let open = text.find('(').ok_or_else(|| parse_err("missing '('"))?;
        let close = text.rfind(')').ok_or_else(|| parse_err("missing ')'"))?;
        if close < open {
            return Err(parse_err("')' before '('"));
        }

        let name = text[..open].trim();
        if name.is_empty() {
            return Err(parse_err("missing table name"));
        }

        let mut fields = Vec::new();
        let mut primary_key = None;
        for column in text[open + 1..close].split(',') {
            let parts: Vec<&str> = column.split_whitespace().collect();
            let (field_name, ty, annotation) = match parts.as_slice() {
                [field_name, ty] => (*field_name, *ty, None),
                [field_name, ty, annotation] => (*field_name, *ty, Some(*annotation)),
                _ => return Err(parse_err(&format!("bad field {:?}", column.trim()))),
            };

            let field_type: Type = ty.parse().map_err(|_: RecordError| CatalogError::UnknownType {
                line,
                ty: ty.to_string(),
            })?;

            match annotation {
                None => {}
                Some("pk") => primary_key = Some(field_name.to_string()),
                Some(other) => {
                    return Err(CatalogError::UnknownAnnotation {
                        line,
                        annotation: other.to_string(),
                    });
                }
            }
            fields.push(FieldDef::new(field_type, Some(field_name.to_string())));
        }

        let schema = Schema::new(fields).map_err(|e| parse_err(&e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            schema,
            primary_key,
        })
    }
}

#[derive(Debug)]
struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
    primary_key: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    by_id: BTreeMap<TableId, TableEntry>,
    by_name: HashMap<String, TableId>,
    last_id: u32,
}

/// Registry of the tables known to a database, keyed by id and by name
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `file` as table `name` and return its new id. A table
    /// already registered under `name` is replaced.
    pub fn add_table(&self, mut file: HeapFile, name: &str, primary_key: Option<&str>) -> TableId {
        let mut tables = self.write();
        if let Some(old) = tables.by_name.remove(name) {
            tables.by_id.remove(&old);
        }

        tables.last_id += 1;
        let table_id = TableId(tables.last_id);
        file.set_table_id(table_id);

        tables.by_name.insert(name.to_string(), table_id);
        tables.by_id.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file: Arc::new(file),
                primary_key: primary_key.map(str::to_string),
            },
        );
        table_id
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    fn with_entry<T>(&self, table_id: TableId, f: impl FnOnce(&TableEntry) -> T) -> CatalogResult<T> {
        self.read()
            .by_id
            .get(&table_id)
            .map(f)
            .ok_or_else(|| CatalogError::TableNotFound(table_id.to_string()))
    }

    pub fn schema(&self, table_id: TableId) -> CatalogResult<Arc<Schema>> {
        self.with_entry(table_id, |entry| Arc::clone(entry.file.schema()))
    }

    pub fn file(&self, table_id: TableId) -> CatalogResult<Arc<HeapFile>> {
        self.with_entry(table_id, |entry| Arc::clone(&entry.file))
    }

    pub fn table_name(&self, table_id: TableId) -> CatalogResult<String> {
        self.with_entry(table_id, |entry| entry.name.clone())
    }

    pub fn primary_key(&self, table_id: TableId) -> CatalogResult<Option<String>> {
        self.with_entry(table_id, |entry| entry.primary_key.clone())
    }

    /// Ids of all registered tables, in registration order
    pub fn table_ids(&self) -> Vec<TableId> {
        self.read().by_id.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut tables = self.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register every table listed in the schema file at `path`.
    ///
    /// Table `name` is stored in `name.dat` next to the schema file and is
    /// created empty if missing. Blank lines are skipped.
    pub fn load_schema<P: AsRef<Path>>(&self, path: P, page_size: usize) -> CatalogResult<Vec<TableId>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let defs = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| TableDef::parse(line, idx + 1))
            .collect::<CatalogResult<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            let schema = Arc::new(def.schema);
            let file = HeapFile::open(
                base.join(format!("{}.dat", def.name)),
                Arc::clone(&schema),
                page_size,
            )?;
            let table_id = self.add_table(file, &def.name, def.primary_key.as_deref());
            tracing::info!(table = %def.name, %table_id, %schema, "added table");
            ids.push(table_id);
        }
        Ok(ids)
    }
}
