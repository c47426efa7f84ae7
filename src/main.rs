use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use heapdb::{
    Database, DatabaseResult, EngineConfig, Field, LockMode, PageId, Record, RecordError, RecordId,
    TableId, TransactionId, Type, encoder,
};

#[derive(Debug, Parser)]
#[command(name = "heapdb", version, about = "Page-based heap file storage engine")]
struct Cli {
    /// JSON engine configuration; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a comma separated text file into a heap file
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Field types, e.g. int,int,string
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<Type>,
    },
    /// Print every record of a table
    Scan {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        table: String,
    },
    /// Insert one record and commit
    Insert {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<String>,
    },
    /// Delete the record at a page and slot and commit
    Delete {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        slot: usize,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Convert {
            input,
            output,
            types,
        } => {
            let written = encoder::convert(&input, &output, config.page_size, &types)?;
            println!("Wrote {} records to {}", written, output.display());
        }
        Command::Scan { catalog, table } => {
            let db = Database::open(&catalog, config)?;
            let table_id = db.catalog().table_id(&table)?;
            let tid = db.begin();
            let result = print_table(&db, tid, table_id);
            finish(&db, tid, result)?;
        }
        Command::Insert {
            catalog,
            table,
            values,
        } => {
            let db = Database::open(&catalog, config)?;
            let table_id = db.catalog().table_id(&table)?;
            let tid = db.begin();
            let result = insert(&db, tid, table_id, &values);
            let rid = finish(&db, tid, result)?;
            println!("Inserted at page {} slot {}", rid.page_id.page_no, rid.slot_id);
        }
        Command::Delete {
            catalog,
            table,
            page,
            slot,
        } => {
            let db = Database::open(&catalog, config)?;
            let table_id = db.catalog().table_id(&table)?;
            let tid = db.begin();
            let result = delete(&db, tid, PageId::new(table_id, page), slot);
            finish(&db, tid, result)?;
            println!("Deleted page {} slot {}", page, slot);
        }
    }
    Ok(())
}

/// Commit on success, abort on failure
fn finish<T>(db: &Database, tid: TransactionId, result: DatabaseResult<T>) -> DatabaseResult<T> {
    match result {
        Ok(value) => {
            db.commit(tid)?;
            Ok(value)
        }
        Err(e) => {
            db.abort(tid)?;
            Err(e)
        }
    }
}

fn print_table(db: &Database, tid: TransactionId, table_id: TableId) -> DatabaseResult<()> {
    let schema = db.catalog().schema(table_id)?;
    let mut table = Table::new();
    table.set_titles(Row::new(
        (0..schema.num_fields())
            .map(|idx| match (schema.field_name(idx), schema.field_type(idx)) {
                (Some(name), _) => Cell::new(name),
                (None, Some(ty)) => Cell::new(&ty.to_string()),
                (None, None) => Cell::new(""),
            })
            .collect(),
    ));

    let mut count = 0;
    for record in db.open_scan(tid, table_id)? {
        let record = record?;
        table.add_row(Row::new(
            record
                .fields()
                .iter()
                .map(|field| match field {
                    Field::Int(v) => Cell::new(&v.to_string()).style_spec("r"),
                    Field::Str(s) => Cell::new(s),
                })
                .collect(),
        ));
        count += 1;
    }

    table.printstd();
    println!("{} rows", count);
    Ok(())
}

fn insert(db: &Database, tid: TransactionId, table_id: TableId, values: &[String]) -> DatabaseResult<RecordId> {
    let schema = db.catalog().schema(table_id)?;
    if values.len() != schema.num_fields() {
        return Err(RecordError::SchemaMismatch(format!(
            "Expected {} values, got {}",
            schema.num_fields(),
            values.len()
        ))
        .into());
    }

    let fields = schema
        .fields()
        .iter()
        .zip(values)
        .map(|(def, text)| def.field_type.parse_text(text))
        .collect::<Result<Vec<_>, _>>()?;
    let record = Record::new(schema, fields)?;
    db.insert_record(tid, table_id, record)
}

fn delete(db: &Database, tid: TransactionId, page_id: PageId, slot: usize) -> DatabaseResult<()> {
    let page = db.fetch_page(tid, page_id, LockMode::Exclusive)?;
    let record = {
        let page = page.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        page.as_heap()
            .and_then(|heap| heap.record(slot))
            .cloned()
            .ok_or_else(|| RecordError::RecordNotFound {
                page_id,
                detail: format!("slot {} is empty", slot),
            })?
    };
    db.delete_record(tid, &record)
}
