use std::fmt::{self, Display};

use crate::{
    error::{DbError, Result},
    tuple::{Tuple, TupleDesc},
};

// Compile-time fixed page size, selected via Cargo features.
// Exactly one of `page-4k` or `page-8k` should be enabled.
#[cfg(feature = "page-4k")]
pub const PAGE_SIZE: usize = 4096;
#[cfg(feature = "page-8k")]
pub const PAGE_SIZE: usize = 8192;

#[cfg(all(feature = "page-4k", feature = "page-8k"))]
compile_error!("Enable only one page size feature (`page-4k` or `page-8k`)");

#[cfg(not(any(feature = "page-4k", feature = "page-8k")))]
compile_error!("One of `page-4k` or `page-8k` features must be enabled to select a page size.");

/// Identity of a page: the file it lives in and its index within that file.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct PageId {
    pub file_name: String,
    pub page_num: usize,
}

impl PageId {
    pub fn new(file_name: impl Into<String>, page_num: usize) -> Self {
        Self {
            file_name: file_name.into(),
            page_num,
        }
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file_name, self.page_num)
    }
}

/// The raw contents of one page. Structure is imposed by views like [`HeapPage`].
#[derive(Clone, Debug)]
pub struct Page {
    contents: Vec<u8>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            contents: vec![0; PAGE_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.contents
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.contents
    }
}

/// A slotted view over a page buffer holding fixed-width tuples.
///
/// Layout:
/// - bytes `[0, ceil(capacity / 8))`: occupancy bitmap, slot `i` is bit
///   `7 - i % 8` of byte `i / 8`
/// - bytes `[page_size - capacity * tuple_len, page_size)`: the slot array,
///   slot `i` at `data_start + i * tuple_len`
///
/// Anything between the two regions is unused. The view borrows the buffer;
/// `B` is `&[u8]` for read-only access and `&mut [u8]` to mutate.
pub struct HeapPage<'td, B> {
    buf: B,
    td: &'td TupleDesc,
    capacity: usize,
    data_start: usize,
}

impl<'td, B: AsRef<[u8]>> HeapPage<'td, B> {
    pub fn new(buf: B, td: &'td TupleDesc) -> Self {
        let page_size = buf.as_ref().len();
        let capacity = Self::capacity_for(page_size, td.length());
        let data_start = page_size - capacity * td.length();
        Self {
            buf,
            td,
            capacity,
            data_start,
        }
    }

    /// Largest slot count whose tuples plus one header bit each fit in `page_size` bytes.
    pub fn capacity_for(page_size: usize, tuple_len: usize) -> usize {
        (page_size * 8) / (tuple_len * 8 + 1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn header_len(&self) -> usize {
        self.capacity.div_ceil(8)
    }

    pub fn empty(&self, slot: usize) -> Result<bool> {
        self.check_slot(slot)?;
        let byte = self.buf.as_ref()[slot / 8];
        Ok(byte & (1 << (7 - slot % 8)) == 0)
    }

    pub fn get_tuple(&self, slot: usize) -> Result<Tuple> {
        if slot >= self.capacity || self.empty(slot)? {
            return Err(DbError::InvalidState(format!(
                "slot {} is empty or out of range (capacity {})",
                slot, self.capacity
            )));
        }
        self.td.deserialize(&self.buf.as_ref()[self.slot_range(slot)])
    }

    /// First occupied slot, or [`HeapPage::end`] if the page holds nothing.
    pub fn begin(&self) -> usize {
        self.first_occupied_from(0)
    }

    /// One past the last slot; also the "not found" position.
    pub fn end(&self) -> usize {
        self.capacity
    }

    /// Advance `slot` to the next occupied slot after it, or to [`HeapPage::end`].
    pub fn next(&self, slot: &mut usize) {
        *slot = self.first_occupied_from(*slot + 1);
    }

    fn first_occupied_from(&self, from: usize) -> usize {
        (from..self.capacity)
            .find(|&i| self.is_set(i))
            .unwrap_or(self.capacity)
    }

    fn is_set(&self, slot: usize) -> bool {
        self.buf.as_ref()[slot / 8] & (1 << (7 - slot % 8)) != 0
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.capacity {
            return Err(DbError::OutOfRange(format!(
                "slot {} of a page with capacity {}",
                slot, self.capacity
            )));
        }
        Ok(())
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.data_start + slot * self.td.length();
        start..start + self.td.length()
    }
}

impl<'td, B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<'td, B> {
    /// Store `tuple` in the first empty slot. Returns `false` when the page is full.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<bool> {
        let Some(slot) = (0..self.capacity).find(|&i| !self.is_set(i)) else {
            return Ok(false);
        };
        let range = self.slot_range(slot);
        self.td.serialize(&mut self.buf.as_mut()[range], tuple)?;
        self.buf.as_mut()[slot / 8] |= 1 << (7 - slot % 8);
        Ok(true)
    }

    /// Clear the occupancy bit of `slot`. The tuple bytes stay where they are.
    pub fn delete_tuple(&mut self, slot: usize) -> Result<()> {
        if self.empty(slot)? {
            return Err(DbError::InvalidState(format!("slot {slot} is already empty")));
        }
        self.buf.as_mut()[slot / 8] &= !(1 << (7 - slot % 8));
        Ok(())
    }
}

#[cfg(test)]
mod heap_page_tests {
    use super::*;
    use crate::tuple::{FieldType, CHAR_SIZE};

    fn schema() -> TupleDesc {
        TupleDesc::new(vec![FieldType::Int, FieldType::Char], vec!["id", "name"]).unwrap()
    }

    fn row(id: i32) -> Tuple {
        Tuple::new(vec![id.into(), format!("row-{id}").into()])
    }

    #[test]
    fn capacity_fits_header_and_slots() {
        for (page_size, tuple_len) in [(4096, 68), (4096, 4), (8192, 12), (4096, 4096), (100, 3)] {
            let capacity = HeapPage::<&[u8]>::capacity_for(page_size, tuple_len);
            assert!(capacity * tuple_len + capacity.div_ceil(8) <= page_size);
            let more = capacity + 1;
            assert!(more * tuple_len + more.div_ceil(8) > page_size);
        }
    }

    #[test]
    fn new_page_has_no_tuples() {
        let td = schema();
        let page = Page::new();
        let hp = HeapPage::new(page.bytes(), &td);
        assert_eq!(hp.capacity(), (PAGE_SIZE * 8) / ((4 + CHAR_SIZE) * 8 + 1));
        assert_eq!(hp.begin(), hp.end());
        for slot in 0..hp.capacity() {
            assert!(hp.empty(slot).unwrap());
        }
        assert!(matches!(hp.empty(hp.capacity()), Err(DbError::OutOfRange(_))));
    }

    #[test]
    fn insert_sets_msb_first_bits_and_writes_at_page_end() {
        let td = schema();
        let mut page = Page::new();
        let mut hp = HeapPage::new(page.bytes_mut(), &td);
        let capacity = hp.capacity();
        assert!(hp.insert_tuple(&row(1)).unwrap());
        assert!(hp.insert_tuple(&row(2)).unwrap());
        assert!(!hp.empty(0).unwrap());
        assert!(!hp.empty(1).unwrap());
        assert!(hp.empty(2).unwrap());
        assert_eq!(hp.get_tuple(1).unwrap(), row(2));

        let bytes = page.bytes();
        assert_eq!(bytes[0], 0b1100_0000);
        let data_start = PAGE_SIZE - capacity * td.length();
        assert_eq!(&bytes[data_start..data_start + 4], &1i32.to_ne_bytes());
    }

    #[test]
    fn full_page_rejects_inserts_without_changes() {
        let td = schema();
        let mut page = Page::new();
        let mut hp = HeapPage::new(page.bytes_mut(), &td);
        let capacity = hp.capacity();
        for i in 0..capacity {
            assert!(hp.insert_tuple(&row(i as i32)).unwrap());
        }
        let before = page.clone();
        let mut hp = HeapPage::new(page.bytes_mut(), &td);
        assert!(!hp.insert_tuple(&row(-1)).unwrap());
        assert_eq!(before.bytes(), page.bytes());
    }

    #[test]
    fn delete_clears_bit_and_slot_is_reused() {
        let td = schema();
        let mut page = Page::new();
        let mut hp = HeapPage::new(page.bytes_mut(), &td);
        for i in 0..3 {
            hp.insert_tuple(&row(i)).unwrap();
        }
        hp.delete_tuple(1).unwrap();
        assert!(hp.empty(1).unwrap());
        assert!(matches!(hp.delete_tuple(1), Err(DbError::InvalidState(_))));
        assert!(matches!(hp.get_tuple(1), Err(DbError::InvalidState(_))));
        assert!(matches!(
            hp.delete_tuple(hp.capacity()),
            Err(DbError::OutOfRange(_))
        ));

        hp.insert_tuple(&row(9)).unwrap();
        assert_eq!(hp.get_tuple(1).unwrap(), row(9));
        assert_eq!(hp.get_tuple(2).unwrap(), row(2));
    }

    #[test]
    fn iteration_skips_empty_slots() {
        let td = schema();
        let mut page = Page::new();
        let mut hp = HeapPage::new(page.bytes_mut(), &td);
        for i in 0..5 {
            hp.insert_tuple(&row(i)).unwrap();
        }
        hp.delete_tuple(0).unwrap();
        hp.delete_tuple(2).unwrap();

        let hp = HeapPage::new(page.bytes(), &td);
        let mut visited = Vec::new();
        let mut slot = hp.begin();
        while slot != hp.end() {
            visited.push(slot);
            hp.next(&mut slot);
        }
        assert_eq!(visited, vec![1, 3, 4]);
    }
}
