//! Free-list manager: pop/push single pages and whole chains off the
//! singly-linked free list rooted at the file header's `first_free_page`.

use tracing::trace;

use crate::backing::BackingFile;
use crate::chapter::PAGES_PER_CHAPTER;
use crate::error::Result;
use crate::page::{self, PAGE_DATA_SIZE};
use crate::store::Inner;

impl<F: BackingFile> Inner<F> {
    /// Pops one page off the free list, growing the file by a chapter if
    /// the list would otherwise be exhausted. Returns the popped page's
    /// index. Writes the file header (but does not flush — flushing is
    /// the public operation's responsibility).
    pub(crate) fn allocate_page(&mut self) -> Result<u32> {
        let popped = self.first_free_page;
        let mut page = self.read_page(popped)?;
        let header = page::read_header(&page);
        let mut next = header.link;
        if next == 0 {
            self.add_chapter()?;
            next = (self.chapter_count - 1) * PAGES_PER_CHAPTER as u32;
        }
        self.first_free_page = next;

        page::write_header(&mut page, page::STATUS_ALLOCATED, 0, 0);
        page::recompute_crc(&mut page);
        self.write_page(popped, &page)?;
        self.write_header_to_disk()?;
        trace!(page = popped, next_free = next, "allocated page");
        Ok(popped)
    }

    /// Allocates a chain of pages with room for `size` bytes and returns
    /// the head page's index. Per-page `length` fields are left at zero;
    /// the stream engine sets them once actual data is written.
    pub(crate) fn allocate_chain(&mut self, size: u32) -> Result<u32> {
        let head = self.allocate_page()?;
        let mut remaining = size as i64 - PAGE_DATA_SIZE as i64;
        let mut current = head;
        while remaining > 0 {
            let next = self.allocate_page()?;
            let mut page = self.read_page(current)?;
            page::write_link(&mut page, next);
            page::recompute_crc(&mut page);
            self.write_page(current, &page)?;
            current = next;
            remaining -= PAGE_DATA_SIZE as i64;
        }
        trace!(head, size, "allocated chain");
        Ok(head)
    }

    /// Frees every page in the chain starting at `handle`, splicing the
    /// whole freed chain onto the front of the free list in one step: the
    /// chain's internal links are untouched, only its terminator's link is
    /// rewritten to point at the old `first_free_page`.
    pub(crate) fn free_chain(&mut self, handle: u32) -> Result<()> {
        let mut current = handle;
        loop {
            let mut page = self.read_page(current)?;
            let header = page::read_header(&page);
            if header.link == 0 {
                page::write_header(&mut page, page::STATUS_FREE, self.first_free_page, 0);
                page::recompute_crc(&mut page);
                self.write_page(current, &page)?;
                break;
            }
            page::write_header(&mut page, page::STATUS_FREE, header.link, 0);
            page::recompute_crc(&mut page);
            self.write_page(current, &page)?;
            current = header.link;
        }
        self.first_free_page = handle;
        self.write_header_to_disk()?;
        trace!(handle, "freed chain");
        Ok(())
    }
}
