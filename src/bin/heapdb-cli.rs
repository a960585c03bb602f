use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heapdb::{
    ColumnStats, Cursor, Database, DbError, DbFile, Field, FieldType, HeapFile, HeapPage, Page,
    PredicateOp, Tuple, TupleDesc, PAGE_SIZE,
};

/// Inspect and edit heap files.
#[derive(Parser, Debug)]
#[command(name = "heapdb", version, about)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./heapdb-data")]
    dir: PathBuf,

    /// Heap file name inside the database directory
    #[arg(long, short)]
    file: String,

    /// Schema as comma separated `name:type` pairs, types being int, double or char
    #[arg(long, short)]
    schema: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert rows given as comma separated values
    Insert { rows: Vec<String> },
    /// Print every tuple with its page and slot
    Scan,
    /// Delete the tuple at a page and slot
    Delete {
        #[arg(long)]
        page: usize,
        #[arg(long)]
        slot: usize,
    },
    /// Show page count and page layout
    Info,
    /// Estimate how many rows satisfy `column OP value` from a histogram
    Estimate {
        #[arg(long)]
        column: String,
        #[arg(long)]
        op: PredicateOp,
        #[arg(long, allow_hyphen_values = true)]
        value: i32,
        #[arg(long, default_value_t = 10)]
        buckets: usize,
        #[arg(long, allow_hyphen_values = true)]
        min: i32,
        #[arg(long, allow_hyphen_values = true)]
        max: i32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let td = parse_schema(&args.schema)?;
    let db = Database::new(&args.dir)?;
    let file = db.open_heap_file(&args.file, td)?;

    match args.command {
        Command::Insert { rows } => {
            for row in &rows {
                file.insert_tuple(&parse_row(file.tuple_desc(), row)?)?;
            }
            db.flush()?;
            println!("inserted {} rows, {} pages", rows.len(), file.num_pages());
        }
        Command::Scan => {
            for item in file.scan() {
                let (cursor, tuple) = item?;
                println!("{:>6} {:>5}  {}", cursor.page, cursor.slot, tuple);
            }
        }
        Command::Delete { page, slot } => {
            file.delete_tuple(&Cursor::new(page, slot))?;
            db.flush()?;
            println!("deleted page {page} slot {slot}");
        }
        Command::Info => show_info(&file),
        Command::Estimate {
            column,
            op,
            value,
            buckets,
            min,
            max,
        } => {
            let index = file.tuple_desc().index_of(&column)?;
            let mut stats = ColumnStats::new(buckets, min, max)?;
            let mut actual = 0;
            for item in file.scan() {
                let (_, tuple) = item?;
                let v = tuple.get_field(index)?.as_int()?;
                stats.add_value(v);
                if holds(op, v, value) {
                    actual += 1;
                }
            }
            println!(
                "{column} {op} {value}: estimated {}, actual {actual}, histogram total {}",
                stats.estimate_cardinality(op, value),
                stats.total_count()
            );
        }
    }
    Ok(())
}

fn show_info(file: &HeapFile) {
    let td = file.tuple_desc();
    let page = Page::new();
    let hp = HeapPage::new(page.bytes(), td);
    println!("File:          {}", file.page_file().path().display());
    println!("Schema:        {td}");
    println!("Tuple length:  {} bytes", td.length());
    println!("Page size:     {PAGE_SIZE} bytes");
    println!("Slots/page:    {}", hp.capacity());
    println!("Header bytes:  {}", hp.header_len());
    println!("Pages:         {}", file.num_pages());
}

fn parse_schema(schema: &str) -> Result<TupleDesc, DbError> {
    let mut types = Vec::new();
    let mut names = Vec::new();
    for column in schema.split(',') {
        let (name, ty) = column
            .split_once(':')
            .ok_or_else(|| DbError::InvalidArgument(format!("column {column} has no type")))?;
        let ty = match ty.trim().to_ascii_lowercase().as_str() {
            "int" => FieldType::Int,
            "double" => FieldType::Double,
            "char" => FieldType::Char,
            other => return Err(DbError::InvalidArgument(format!("unknown type {other}"))),
        };
        types.push(ty);
        names.push(name.trim().to_string());
    }
    TupleDesc::new(types, names)
}

fn parse_row(td: &TupleDesc, row: &str) -> Result<Tuple, Box<dyn Error>> {
    let values: Vec<&str> = row.split(',').collect();
    if values.len() != td.size() {
        return Err(format!("row {row:?} has {} values, expected {}", values.len(), td.size()).into());
    }
    let fields = td
        .types()
        .iter()
        .zip(values)
        .map(|(ty, v)| -> Result<Field, Box<dyn Error>> {
            let v = v.trim();
            Ok(match ty {
                FieldType::Int => Field::Int(v.parse()?),
                FieldType::Double => Field::Double(v.parse()?),
                FieldType::Char => Field::Char(v.to_string()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Tuple::new(fields))
}

fn holds(op: PredicateOp, x: i32, v: i32) -> bool {
    match op {
        PredicateOp::Eq => x == v,
        PredicateOp::Ne => x != v,
        PredicateOp::Lt => x < v,
        PredicateOp::Le => x <= v,
        PredicateOp::Gt => x > v,
        PredicateOp::Ge => x >= v,
    }
}
