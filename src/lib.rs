//! Heap-file storage engine.
//!
//! This crate provides:
//! - Fixed-width tuple schemas and their binary encoding ([`TupleDesc`], [`Tuple`])
//! - Page-granular file I/O ([`PageFile`]) behind the row-level [`DbFile`] trait
//! - Bitmap-slotted heap pages ([`HeapPage`]) and unordered heap files ([`HeapFile`])
//! - A shared page cache with dirty tracking ([`BufferPool`])
//! - Equi-width histograms for selectivity estimation ([`ColumnStats`])

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

pub mod buffer_pool;
pub mod error;
pub mod file;
pub mod heap_file;
pub mod page;
pub mod stats;
pub mod test_utils;
pub mod tuple;

pub use buffer_pool::{BufferPool, BufferStats};
pub use error::{DbError, Result};
pub use file::{Cursor, DbFile, PageFile};
pub use heap_file::{HeapFile, Scan};
pub use page::{HeapPage, Page, PageId, PAGE_SIZE};
pub use stats::{ColumnStats, PredicateOp};
pub use test_utils::TestDir;
pub use tuple::{Field, FieldType, Tuple, TupleDesc, CHAR_SIZE};

/// The database: a directory of heap files sharing one buffer pool.
#[derive(Debug)]
pub struct Database {
    db_directory: PathBuf,
    buffer_pool: Arc<BufferPool>,
    files: RwLock<HashMap<String, Arc<HeapFile>>>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_directory = path.as_ref().to_path_buf();
        fs::create_dir_all(&db_directory)?;
        Ok(Self {
            db_directory,
            buffer_pool: Arc::new(BufferPool::new()),
            files: RwLock::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    fn new_for_test(test: &str) -> (Self, TestDir) {
        let test_dir = TestDir::unique(test);
        let db = Self::new(&test_dir).unwrap();
        (db, test_dir)
    }

    pub fn db_directory(&self) -> &Path {
        &self.db_directory
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Open (or create) heap file `name` in the database directory with schema `td`.
    pub fn open_heap_file(&self, name: &str, td: TupleDesc) -> Result<Arc<HeapFile>> {
        let mut files = self.files.write().unwrap();
        if files.contains_key(name) {
            return Err(DbError::InvalidArgument(format!("{name} is already open")));
        }
        let file = Arc::new(HeapFile::open(
            name,
            self.db_directory.join(name),
            td,
            Arc::clone(&self.buffer_pool),
        )?);
        files.insert(name.to_string(), Arc::clone(&file));
        Ok(file)
    }

    pub fn get_file(&self, name: &str) -> Result<Arc<HeapFile>> {
        self.files
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownFile(name.to_string()))
    }

    /// Flush `name`'s dirty pages and close it.
    pub fn remove_file(&self, name: &str) -> Result<Arc<HeapFile>> {
        let file = self.get_file(name)?;
        for page_num in 0..file.num_pages() {
            self.buffer_pool.flush_page(&PageId::new(name, page_num))?;
        }
        self.buffer_pool.unregister(name);
        self.files.write().unwrap().remove(name);
        Ok(file)
    }

    /// Write every dirty page to disk.
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all()
    }
}

#[cfg(test)]
mod database_tests {
    use super::*;

    fn schema() -> TupleDesc {
        TupleDesc::new(
            vec![FieldType::Int, FieldType::Double],
            vec!["id", "price"],
        )
        .unwrap()
    }

    #[test]
    fn files_are_registered_by_name() {
        let (db, _test_dir) = Database::new_for_test("db_registry");
        let file = db.open_heap_file("items.dat", schema()).unwrap();
        assert_eq!(file.name(), "items.dat");
        assert!(Arc::ptr_eq(&file, &db.get_file("items.dat").unwrap()));
        assert!(matches!(
            db.open_heap_file("items.dat", schema()),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(db.get_file("other.dat"), Err(DbError::UnknownFile(_))));
    }

    #[test]
    fn files_share_one_buffer_pool() {
        let (db, _test_dir) = Database::new_for_test("db_shared_pool");
        let a = db.open_heap_file("a.dat", schema()).unwrap();
        let b = db.open_heap_file("b.dat", schema()).unwrap();
        a.insert_tuple(&Tuple::new(vec![1.into(), 1.5.into()])).unwrap();
        b.insert_tuple(&Tuple::new(vec![2.into(), 2.5.into()])).unwrap();
        assert_eq!(db.buffer_pool().resident_pages(), 2);
        assert!(db.buffer_pool().is_dirty(&PageId::new("a.dat", 0)));
        db.flush().unwrap();
        assert!(!db.buffer_pool().is_dirty(&PageId::new("a.dat", 0)));
        assert_eq!(a.page_file().writes(), vec![0]);
    }

    #[test]
    fn removed_files_are_flushed_and_reopenable() {
        let (db, _test_dir) = Database::new_for_test("db_remove");
        let file = db.open_heap_file("items.dat", schema()).unwrap();
        for i in 0..10 {
            file.insert_tuple(&Tuple::new(vec![i.into(), (i as f64 / 2.0).into()]))
                .unwrap();
        }
        drop(file);
        db.remove_file("items.dat").unwrap();
        assert_eq!(db.buffer_pool().resident_pages(), 0);

        let file = db.open_heap_file("items.dat", schema()).unwrap();
        let prices: Vec<f64> = file
            .scan()
            .map(|item| item.unwrap().1.get_field(1).unwrap().as_double().unwrap())
            .collect();
        assert_eq!(prices.len(), 10);
        assert_eq!(prices[9], 4.5);
    }
}
