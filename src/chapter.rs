//! Chapter allocator: grows the file by one 16 MiB chapter of pre-linked
//! free pages, built in memory and written in a single positioned write.

use tracing::trace;

use crate::error::{Error, Result};
use crate::page::{self, PAGE_SIZE};
use crate::store::Inner;
use crate::backing::BackingFile;

/// Pages per chapter.
pub const PAGES_PER_CHAPTER: usize = 4096;

/// A page index is a `u32`; no file may ever grow past this many pages.
const MAX_PAGES: u64 = 1u64 << 32;

impl<F: BackingFile> Inner<F> {
    /// Appends one chapter of freshly-linked free pages to the file.
    ///
    /// Does not touch `first_free_page` or write the file header — splicing
    /// the new chapter onto the existing free list is the caller's job (see
    /// [`Inner::allocate_page`]). This is a deliberate write-amplification
    /// optimization: growing a chapter is one write, not two.
    pub(crate) fn add_chapter(&mut self) -> Result<()> {
        let base = self.chapter_count as u64 * PAGES_PER_CHAPTER as u64;
        let new_total_pages = (self.chapter_count as u64 + 1) * PAGES_PER_CHAPTER as u64;
        if new_total_pages > MAX_PAGES {
            return Err(Error::OutOfSpace);
        }

        let mut buf = vec![0u8; PAGES_PER_CHAPTER * PAGE_SIZE];
        for i in 0..PAGES_PER_CHAPTER as u64 {
            let page_index = base + i;
            let link = if i + 1 == PAGES_PER_CHAPTER as u64 {
                0
            } else {
                (page_index + 1) as u32
            };
            let start = i as usize * PAGE_SIZE;
            let page: &mut [u8; PAGE_SIZE] = (&mut buf[start..start + PAGE_SIZE])
                .try_into()
                .expect("chapter buffer slice is exactly one page");
            page::write_header(page, page::STATUS_FREE, link, 0);
            page::recompute_crc(page);
        }

        self.file.write_all_at(&buf, base * PAGE_SIZE as u64)?;
        self.chapter_count += 1;
        trace!(chapter = self.chapter_count, base, "added chapter");
        Ok(())
    }
}
