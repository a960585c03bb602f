use std::{
    fs::{File, OpenOptions},
    io,
    mem::ManuallyDrop,
    os::unix::{fs::FileExt, io::IntoRawFd},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use crate::{
    error::{DbError, Result},
    page::{Page, PAGE_SIZE},
    tuple::{Tuple, TupleDesc},
};

/// A position inside a [`DbFile`]: a page number and a slot within that page.
///
/// The end position is `(num_pages, 0)`. A cursor is only meaningful while the
/// file's page count is unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub page: usize,
    pub slot: usize,
}

impl Cursor {
    pub fn new(page: usize, slot: usize) -> Self {
        Self { page, slot }
    }
}

/// Row-level operations of a storage structure laid over a [`PageFile`].
pub trait DbFile {
    /// The underlying page-granular file.
    fn page_file(&self) -> &PageFile;

    fn tuple_desc(&self) -> &TupleDesc;

    fn name(&self) -> &str {
        self.page_file().name()
    }

    fn num_pages(&self) -> usize {
        self.page_file().num_pages()
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Result<()>;

    fn delete_tuple(&self, cursor: &Cursor) -> Result<()>;

    fn get_tuple(&self, cursor: &Cursor) -> Result<Tuple>;

    fn next(&self, cursor: &mut Cursor) -> Result<()>;

    fn begin(&self) -> Result<Cursor>;

    fn end(&self) -> Cursor;
}

/// An on-disk file read and written one [`PAGE_SIZE`] page at a time.
///
/// Page `i` lives at byte offset `i * PAGE_SIZE`. There is no header; the page
/// count is derived from the file length when opened, and is never below one.
#[derive(Debug)]
pub struct PageFile {
    name: String,
    path: PathBuf,
    file: ManuallyDrop<File>,
    num_pages: AtomicUsize,
    reads: Mutex<Vec<usize>>,
    writes: Mutex<Vec<usize>>,
}

impl PageFile {
    /// Open `path`, creating it if needed. `name` is the identity used in page ids.
    pub fn open<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let len = file.metadata()?.len() as usize;
        let num_pages = (len / PAGE_SIZE).max(1);
        Ok(Self {
            name: name.to_string(),
            path,
            file: ManuallyDrop::new(file),
            num_pages: AtomicUsize::new(num_pages),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Read page `page_num` into `page`.
    ///
    /// A page wholly past the end of the file reads as zeroes; a page that is
    /// only partly on disk is an error.
    pub fn read_page(&self, page: &mut Page, page_num: usize) -> Result<()> {
        self.reads.lock().unwrap().push(page_num);
        self.check_page(page_num)?;

        let buf = page.bytes_mut();
        let offset = (page_num * PAGE_SIZE) as u64;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => {
                buf.fill(0);
                Ok(())
            }
            n if n == buf.len() => Ok(()),
            n => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read of page {page_num} in {}: {n} bytes", self.name),
            )
            .into()),
        }
    }

    /// Write `page` over the existing page `page_num`.
    pub fn write_page(&self, page: &Page, page_num: usize) -> Result<()> {
        self.writes.lock().unwrap().push(page_num);
        self.check_page(page_num)?;
        self.file
            .write_all_at(page.bytes(), (page_num * PAGE_SIZE) as u64)?;
        Ok(())
    }

    /// Write `page` just past the last page, then count it. Returns its page number.
    pub fn append_page(&self, page: &Page) -> Result<usize> {
        let page_num = self.num_pages();
        self.writes.lock().unwrap().push(page_num);
        self.file
            .write_all_at(page.bytes(), (page_num * PAGE_SIZE) as u64)?;
        self.num_pages.store(page_num + 1, Ordering::Release);
        Ok(page_num)
    }

    /// Page numbers of every `read_page` call, in order.
    pub fn reads(&self) -> Vec<usize> {
        self.reads.lock().unwrap().clone()
    }

    /// Page numbers of every `write_page`/`append_page` call, in order.
    pub fn writes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().clone()
    }

    fn check_page(&self, page_num: usize) -> Result<()> {
        let num_pages = self.num_pages();
        if page_num >= num_pages {
            return Err(DbError::OutOfRange(format!(
                "page {} of {} ({} pages)",
                page_num, self.name, num_pages
            )));
        }
        Ok(())
    }
}

impl Drop for PageFile {
    fn drop(&mut self) {
        //  SAFETY: `file` is never touched again after this point
        let file = unsafe { ManuallyDrop::take(&mut self.file) };
        let fd = file.into_raw_fd();
        if unsafe { libc::close(fd) } == -1 {
            panic!(
                "failed to close {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
    }
}
