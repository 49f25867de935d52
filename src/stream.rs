//! Stream engine: the allocate/write/read operations that operate on a
//! single embedded file's page chain.

use tracing::trace_span;

use crate::backing::BackingFile;
use crate::error::{Error, Result};
use crate::page::{self, PAGE_DATA_SIZE};
use crate::store::Inner;

impl<F: BackingFile> Inner<F> {
    pub(crate) fn stream_length(&mut self, handle: u32) -> Result<u32> {
        let header = self.check_handle_allocated(handle)?;
        Ok(header.length)
    }

    /// Full sequential rewrite of a stream's contents. `count` becomes the
    /// stream's new total length; any pages beyond what's needed are
    /// trimmed and returned to the free list.
    pub(crate) fn stream_write(
        &mut self,
        handle: u32,
        buf: &[u8],
        off: usize,
        count: usize,
    ) -> Result<()> {
        let _span = trace_span!("stream_write", handle, count).entered();
        self.check_handle_allocated(handle)?;
        if off.checked_add(count).map_or(true, |end| end > buf.len()) {
            return Err(Error::OutOfRange(format!(
                "buffer of length {} does not contain {count} bytes at offset {off}",
                buf.len()
            )));
        }

        let mut current = handle;
        let mut consumed = 0usize;
        loop {
            let mut page = self.read_page(current)?;
            let header = page::read_header(&page);
            let remaining = count - consumed;
            let this_chunk = remaining.min(PAGE_DATA_SIZE);
            let more_after = remaining > this_chunk;

            let (link, orphan) = if more_after {
                if header.link != 0 {
                    (header.link, None)
                } else {
                    (self.allocate_page()?, None)
                }
            } else if header.link != 0 {
                (0u32, Some(header.link))
            } else {
                (0u32, None)
            };

            page::write_header(&mut page, page::STATUS_ALLOCATED, link, remaining as u32);
            page::data_mut(&mut page)[..this_chunk]
                .copy_from_slice(&buf[off + consumed..off + consumed + this_chunk]);
            page::recompute_crc(&mut page);
            self.write_page(current, &page)?;
            consumed += this_chunk;

            if let Some(orphan) = orphan {
                self.free_chain(orphan)?;
            }
            if !more_after {
                break;
            }
            current = link;
        }
        self.write_header_to_disk()?;
        Ok(())
    }

    /// In-place partial write. Never shrinks the stream; grows it (and the
    /// chain backing it) if `position + count` exceeds the current length.
    pub(crate) fn stream_write_at(
        &mut self,
        handle: u32,
        position: u32,
        buf: &[u8],
        off: usize,
        count: usize,
    ) -> Result<()> {
        let _span = trace_span!("stream_write_at", handle, position, count).entered();
        let head_header = self.check_handle_allocated(handle)?;
        if off.checked_add(count).map_or(true, |end| end > buf.len()) {
            return Err(Error::OutOfRange(format!(
                "buffer of length {} does not contain {count} bytes at offset {off}",
                buf.len()
            )));
        }

        let write_end = position.checked_add(count as u32).ok_or_else(|| {
            Error::OutOfRange("position + count overflows a 32-bit length".into())
        })?;
        let new_length = head_header.length.max(write_end);
        {
            let mut head_page = self.read_page(handle)?;
            page::write_length(&mut head_page, new_length);
            page::recompute_crc(&mut head_page);
            self.write_page(handle, &head_page)?;
        }

        let hops = position as usize / PAGE_DATA_SIZE;
        let mut within = position as usize % PAGE_DATA_SIZE;
        let mut current = handle;
        for _ in 0..hops {
            let page = self.read_page(current)?;
            let header = page::read_header(&page);
            current = if header.link != 0 {
                header.link
            } else {
                let next = self.allocate_page()?;
                let mut page = page;
                page::write_link(&mut page, next);
                page::recompute_crc(&mut page);
                self.write_page(current, &page)?;
                next
            };
        }

        let mut consumed = 0usize;
        while consumed < count {
            let mut page = self.read_page(current)?;
            let header = page::read_header(&page);
            let space = PAGE_DATA_SIZE - within;
            let this_chunk = (count - consumed).min(space);

            page::data_mut(&mut page)[within..within + this_chunk]
                .copy_from_slice(&buf[off + consumed..off + consumed + this_chunk]);

            let needs_more = consumed + this_chunk < count;
            let link = if needs_more && header.link == 0 {
                self.allocate_page()?
            } else {
                header.link
            };
            if link != header.link {
                page::write_link(&mut page, link);
            }
            page::recompute_crc(&mut page);
            self.write_page(current, &page)?;

            consumed += this_chunk;
            within = 0;
            current = link;
        }
        self.write_header_to_disk()?;
        Ok(())
    }

    /// Reads a stream's entire contents into a freshly-allocated buffer.
    pub(crate) fn stream_read_all(&mut self, handle: u32) -> Result<Vec<u8>> {
        let head_header = self.check_handle_allocated(handle)?;
        let length = head_header.length as usize;
        let mut result = Vec::with_capacity(length);
        let mut current = handle;
        let mut remaining = length;
        while remaining > 0 {
            let page = self.read_page(current)?;
            if self.options.verify_on_read && !page::crc_is_valid(&page) {
                return Err(Error::CorruptData(format!(
                    "page {current} failed checksum verification"
                )));
            }
            let header = page::read_header(&page);
            let this_chunk = remaining.min(PAGE_DATA_SIZE);
            result.extend_from_slice(&page::data(&page)[..this_chunk]);
            remaining -= this_chunk;
            current = header.link;
        }
        Ok(result)
    }

    /// Reads up to `count` bytes starting at `src_off`, clamped to the
    /// stream's actual length, returning the number of bytes read.
    pub(crate) fn stream_read_at(
        &mut self,
        handle: u32,
        buf: &mut [u8],
        src_off: u32,
        count: u32,
    ) -> Result<u32> {
        let head_header = self.check_handle_allocated(handle)?;
        let length = head_header.length;
        if src_off >= length {
            return Ok(0);
        }
        let count = (count.min(length - src_off)) as usize;
        if count > buf.len() {
            return Err(Error::OutOfRange(format!(
                "destination buffer of length {} cannot hold {count} bytes",
                buf.len()
            )));
        }

        let hops = src_off as usize / PAGE_DATA_SIZE;
        let mut within = src_off as usize % PAGE_DATA_SIZE;
        let mut current = handle;
        for _ in 0..hops {
            let page = self.read_page(current)?;
            current = page::read_header(&page).link;
        }

        let mut consumed = 0usize;
        while consumed < count {
            let page = self.read_page(current)?;
            if self.options.verify_on_read && !page::crc_is_valid(&page) {
                return Err(Error::CorruptData(format!(
                    "page {current} failed checksum verification"
                )));
            }
            let header = page::read_header(&page);
            let available = PAGE_DATA_SIZE - within;
            let this_chunk = (count - consumed).min(available);
            buf[consumed..consumed + this_chunk]
                .copy_from_slice(&page::data(&page)[within..within + this_chunk]);
            consumed += this_chunk;
            within = 0;
            current = header.link;
        }
        Ok(count as u32)
    }
}
