//! An in-memory page cache shared by every heap file of a [`crate::Database`].
//!
//! Pages are cached by [`PageId`] and never evicted. Dirty pages reach disk
//! only through [`BufferPool::flush_page`] or [`BufferPool::flush_all`].

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use crate::{
    error::{DbError, Result},
    file::PageFile,
    page::{Page, PageId},
};

#[derive(Debug)]
pub struct BufferFrame {
    page_id: PageId,
    page: RwLock<Page>,
    dirty: AtomicBool,
}

impl BufferFrame {
    fn new(page_id: PageId, page: Page) -> Self {
        Self {
            page_id,
            page: RwLock::new(page),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    pub fn read_page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read().unwrap()
    }

    pub fn write_page(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write().unwrap()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct BufferStats {
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
}

impl Default for BufferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self.get();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub struct BufferPool {
    files: RwLock<HashMap<String, Arc<PageFile>>>,
    frames: Mutex<HashMap<PageId, Arc<BufferFrame>>>,
    stats: BufferStats,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file`'s pages loadable by name.
    pub fn register(&self, file: Arc<PageFile>) {
        self.files
            .write()
            .unwrap()
            .insert(file.name().to_string(), file);
    }

    /// Forget `file_name` and drop its cached pages without writing them.
    pub fn unregister(&self, file_name: &str) {
        self.files.write().unwrap().remove(file_name);
        self.frames
            .lock()
            .unwrap()
            .retain(|page_id, _| page_id.file_name != file_name);
    }

    /// The cached frame for `page_id`, reading it from its file on a miss.
    pub fn get_page(&self, page_id: &PageId) -> Result<Arc<BufferFrame>> {
        let mut frames = self.frames.lock().unwrap();
        if let Some(frame) = frames.get(page_id) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(frame));
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let file = self.file(&page_id.file_name)?;
        let mut page = Page::new();
        file.read_page(&mut page, page_id.page_num)?;
        let frame = Arc::new(BufferFrame::new(page_id.clone(), page));
        frames.insert(page_id.clone(), Arc::clone(&frame));
        Ok(frame)
    }

    /// Cache a page that was just written to disk by its owner.
    pub fn cache_page(&self, page_id: &PageId, page: Page) -> Arc<BufferFrame> {
        let frame = Arc::new(BufferFrame::new(page_id.clone(), page));
        self.frames
            .lock()
            .unwrap()
            .insert(page_id.clone(), Arc::clone(&frame));
        frame
    }

    /// Record that the cached copy of `page_id` must be written before it is dropped.
    pub fn mark_dirty(&self, page_id: &PageId) -> Result<()> {
        let frames = self.frames.lock().unwrap();
        let frame = frames.get(page_id).ok_or_else(|| {
            DbError::InvalidState(format!("page {page_id} is not in the buffer pool"))
        })?;
        frame.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_dirty(&self, page_id: &PageId) -> bool {
        self.frames
            .lock()
            .unwrap()
            .get(page_id)
            .is_some_and(|frame| frame.is_dirty())
    }

    pub fn flush_page(&self, page_id: &PageId) -> Result<()> {
        let frame = match self.frames.lock().unwrap().get(page_id) {
            Some(frame) => Arc::clone(frame),
            None => return Ok(()),
        };
        self.flush_frame(&frame)
    }

    pub fn flush_all(&self) -> Result<()> {
        let frames: Vec<Arc<BufferFrame>> =
            self.frames.lock().unwrap().values().cloned().collect();
        for frame in frames {
            self.flush_frame(&frame)?;
        }
        Ok(())
    }

    /// Number of cached pages.
    pub fn resident_pages(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    fn flush_frame(&self, frame: &BufferFrame) -> Result<()> {
        if !frame.is_dirty() {
            return Ok(());
        }
        let file = self.file(&frame.page_id.file_name)?;
        file.write_page(&frame.read_page(), frame.page_id.page_num)?;
        frame.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn file(&self, file_name: &str) -> Result<Arc<PageFile>> {
        self.files
            .read()
            .unwrap()
            .get(file_name)
            .cloned()
            .ok_or_else(|| DbError::UnknownFile(file_name.to_string()))
    }
}
