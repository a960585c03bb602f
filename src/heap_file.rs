use std::{path::Path, sync::Arc};

use crate::{
    buffer_pool::BufferPool,
    error::{DbError, Result},
    file::{Cursor, DbFile, PageFile},
    page::{HeapPage, Page, PageId},
    tuple::{Tuple, TupleDesc},
};

/// Unordered tuple storage over a sequence of [`HeapPage`]s.
///
/// Existing pages are always accessed through the shared [`BufferPool`]; the
/// only direct write is the initial image of a page appended to grow the file.
#[derive(Debug)]
pub struct HeapFile {
    file: Arc<PageFile>,
    td: TupleDesc,
    buffer_pool: Arc<BufferPool>,
}

impl HeapFile {
    pub fn new(file: PageFile, td: TupleDesc, buffer_pool: Arc<BufferPool>) -> Self {
        let file = Arc::new(file);
        buffer_pool.register(Arc::clone(&file));
        Self {
            file,
            td,
            buffer_pool,
        }
    }

    pub fn open<P: AsRef<Path>>(
        name: &str,
        path: P,
        td: TupleDesc,
        buffer_pool: Arc<BufferPool>,
    ) -> Result<Self> {
        Ok(Self::new(PageFile::open(name, path)?, td, buffer_pool))
    }

    /// Whether the slot under `cursor` holds no tuple.
    pub fn is_empty_slot(&self, cursor: &Cursor) -> Result<bool> {
        self.check_cursor(cursor)?;
        let frame = self.buffer_pool.get_page(&self.page_id(cursor.page))?;
        let page = frame.read_page();
        HeapPage::new(page.bytes(), &self.td).empty(cursor.slot)
    }

    /// Every stored tuple with its position, in page then slot order.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            file: self,
            cursor: None,
            done: false,
        }
    }

    fn page_id(&self, page_num: usize) -> PageId {
        PageId::new(self.file.name(), page_num)
    }

    fn check_cursor(&self, cursor: &Cursor) -> Result<()> {
        if cursor.page >= self.num_pages() {
            return Err(DbError::OutOfRange(format!(
                "page {} of {} ({} pages)",
                cursor.page,
                self.file.name(),
                self.num_pages()
            )));
        }
        Ok(())
    }
}

impl DbFile for HeapFile {
    fn page_file(&self) -> &PageFile {
        &self.file
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    /// First fit over the existing pages; appends a page only when all are full.
    fn insert_tuple(&self, tuple: &Tuple) -> Result<()> {
        if !self.td.compatible(tuple)? {
            return Err(DbError::InvalidArgument(format!(
                "tuple {} does not match schema {}",
                tuple, self.td
            )));
        }

        let num_pages = self.num_pages();
        for page_num in 0..num_pages {
            let page_id = self.page_id(page_num);
            let frame = self.buffer_pool.get_page(&page_id)?;
            let inserted = {
                let mut page = frame.write_page();
                HeapPage::new(page.bytes_mut(), &self.td).insert_tuple(tuple)?
            };
            if inserted {
                return self.buffer_pool.mark_dirty(&page_id);
            }
        }

        let mut page = Page::new();
        if !HeapPage::new(page.bytes_mut(), &self.td).insert_tuple(tuple)? {
            return Err(DbError::InvalidState(format!(
                "a {}-byte tuple does not fit in an empty page",
                self.td.length()
            )));
        }
        //  the page reaches disk before the new page count is visible
        let page_num = self.file.append_page(&page)?;
        let page_id = self.page_id(page_num);
        self.buffer_pool.cache_page(&page_id, page);
        self.buffer_pool.mark_dirty(&page_id)
    }

    fn delete_tuple(&self, cursor: &Cursor) -> Result<()> {
        self.check_cursor(cursor)?;
        let page_id = self.page_id(cursor.page);
        let frame = self.buffer_pool.get_page(&page_id)?;
        {
            let mut page = frame.write_page();
            let mut hp = HeapPage::new(page.bytes_mut(), &self.td);
            if hp.empty(cursor.slot)? {
                return Err(DbError::InvalidState(format!(
                    "slot {} of page {} is empty",
                    cursor.slot, page_id
                )));
            }
            hp.delete_tuple(cursor.slot)?;
        }
        self.buffer_pool.mark_dirty(&page_id)
    }

    fn get_tuple(&self, cursor: &Cursor) -> Result<Tuple> {
        self.check_cursor(cursor)?;
        let frame = self.buffer_pool.get_page(&self.page_id(cursor.page))?;
        let page = frame.read_page();
        HeapPage::new(page.bytes(), &self.td).get_tuple(cursor.slot)
    }

    /// Move to the next occupied slot of the current page, or else to slot 0 of
    /// the following page. That slot is not checked; it may be empty.
    fn next(&self, cursor: &mut Cursor) -> Result<()> {
        self.check_cursor(cursor)?;
        let frame = self.buffer_pool.get_page(&self.page_id(cursor.page))?;
        let page = frame.read_page();
        let hp = HeapPage::new(page.bytes(), &self.td);
        hp.next(&mut cursor.slot);
        if cursor.slot == hp.end() {
            cursor.page += 1;
            cursor.slot = 0;
        }
        Ok(())
    }

    fn begin(&self) -> Result<Cursor> {
        for page_num in 0..self.num_pages() {
            let frame = self.buffer_pool.get_page(&self.page_id(page_num))?;
            let page = frame.read_page();
            let hp = HeapPage::new(page.bytes(), &self.td);
            let first = hp.begin();
            if first != hp.end() {
                return Ok(Cursor::new(page_num, first));
            }
        }
        Ok(self.end())
    }

    fn end(&self) -> Cursor {
        Cursor::new(self.num_pages(), 0)
    }
}

/// Iterator over `(position, tuple)` pairs of a [`HeapFile`].
///
/// Unlike a bare [`DbFile::next`] loop, this re-checks occupancy after moving
/// onto a new page, so it never yields an empty slot. Stops after the first error.
pub struct Scan<'a> {
    file: &'a HeapFile,
    cursor: Option<Cursor>,
    done: bool,
}

impl Scan<'_> {
    fn advance(&mut self) -> Result<Option<(Cursor, Tuple)>> {
        let mut cursor = match self.cursor {
            Some(cursor) => cursor,
            None => self.file.begin()?,
        };
        while cursor.page < self.file.num_pages() {
            if self.file.is_empty_slot(&cursor)? {
                self.file.next(&mut cursor)?;
                continue;
            }
            let tuple = self.file.get_tuple(&cursor)?;
            let at = cursor;
            self.file.next(&mut cursor)?;
            self.cursor = Some(cursor);
            return Ok(Some((at, tuple)));
        }
        self.cursor = Some(cursor);
        Ok(None)
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<(Cursor, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
