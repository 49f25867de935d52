//! Lifecycle and public API: [`Store`] opens, serializes access to, and
//! closes a compound file.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use sync_file::RandomAccessFile;
use tracing::{debug, trace_span};

use crate::backing::BackingFile;
use crate::chapter::PAGES_PER_CHAPTER;
use crate::error::{Error, Result};
use crate::header::FileHeader;
use crate::page::{self, PageHeader, PAGE_SIZE};

/// Tunable knobs governing verification and durability.
///
/// `buffer_size` is accepted for forward compatibility and diagnostics;
/// this crate always issues whole-page positioned I/O, so it is currently
/// informational only.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Verify each page's checksum as it is read, failing the whole read
    /// on the first mismatch.
    pub verify_on_read: bool,
    /// When `false`, every mutating operation behaves as if
    /// `flush_at_write` were also set.
    pub use_write_cache: bool,
    /// Durably flush the backing file at the end of every mutating
    /// operation.
    pub flush_at_write: bool,
    /// Informational I/O buffering hint.
    pub buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            verify_on_read: false,
            use_write_cache: true,
            flush_at_write: false,
            buffer_size: PAGE_SIZE,
        }
    }
}

impl Options {
    fn should_flush(&self) -> bool {
        self.flush_at_write || !self.use_write_cache
    }
}

/// The mutable state behind the store's mutex. Never exposed directly;
/// every method here assumes the caller already holds the lock, which is
/// what makes internal calls (e.g. `stream_write` calling `allocate_page`)
/// reentrant without re-acquiring anything.
pub(crate) struct Inner<F> {
    pub(crate) file: F,
    pub(crate) options: Options,
    pub(crate) first_free_page: u32,
    pub(crate) chapter_count: u32,
    closed: bool,
}

impl<F: BackingFile> Inner<F> {
    pub(crate) fn total_pages(&self) -> u32 {
        self.chapter_count * PAGES_PER_CHAPTER as u32
    }

    pub(crate) fn check_not_closed(&self) -> Result<()> {
        if self.closed {
            Err(Error::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn read_page(&self, index: u32) -> Result<[u8; PAGE_SIZE]> {
        let mut buf = [0u8; PAGE_SIZE];
        self.file
            .read_exact_at(&mut buf, index as u64 * PAGE_SIZE as u64)?;
        Ok(buf)
    }

    pub(crate) fn write_page(&self, index: u32, page: &[u8; PAGE_SIZE]) -> Result<()> {
        self.file.write_all_at(page, index as u64 * PAGE_SIZE as u64)?;
        Ok(())
    }

    pub(crate) fn write_header_to_disk(&self) -> Result<()> {
        let mut page = [0u8; PAGE_SIZE];
        FileHeader {
            first_free_page: self.first_free_page,
        }
        .write_to(&mut page);
        self.write_page(0, &page)
    }

    fn flush_if_needed(&self) -> Result<()> {
        if self.options.should_flush() {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Validates that `handle` is non-zero and within the file, without
    /// checking whether it currently names an allocated or a free page.
    fn check_handle_in_range(&self, handle: u32) -> Result<()> {
        if handle == 0 || handle >= self.total_pages() {
            return Err(Error::InvalidHandle(handle));
        }
        Ok(())
    }

    /// Validates `handle` and returns the head page's header, rejecting
    /// handles that currently name a free page.
    pub(crate) fn check_handle_allocated(&self, handle: u32) -> Result<PageHeader> {
        self.check_handle_in_range(handle)?;
        let page = self.read_page(handle)?;
        let header = page::read_header(&page);
        if header.is_free() {
            return Err(Error::InvalidHandle(handle));
        }
        Ok(header)
    }
}

/// A paged compound file store.
///
/// Every public method acquires a single internal mutex for its full
/// duration and releases it before returning, matching the single
/// store-wide critical section readers and writers share.
pub struct Store<F> {
    inner: Mutex<Inner<F>>,
}

impl Store<RandomAccessFile> {
    /// Opens (creating if necessary) the compound file at `path`.
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        let file = File::options().read(true).write(true).create(true).open(path)?;
        let file = RandomAccessFile::from(file);
        Self::open_with_file(file, options)
    }
}

impl<F: BackingFile> Store<F> {
    /// Opens a compound file backed by an already-constructed `F`.
    ///
    /// If the backing file is empty, initializes a fresh single-chapter
    /// file; otherwise parses and validates the existing header.
    pub fn open_with_file(file: F, options: Options) -> Result<Self> {
        let _span = trace_span!("open_with_file").entered();
        let len = file.len()?;

        let mut inner = Inner {
            file,
            options,
            first_free_page: 0,
            chapter_count: 0,
            closed: false,
        };

        if len == 0 {
            debug!("initializing new compound file");
            inner.add_chapter()?;
            inner.first_free_page = 1;
            inner.write_header_to_disk()?;
            inner.file.sync_data()?;
        } else {
            if len % (PAGES_PER_CHAPTER as u64 * PAGE_SIZE as u64) != 0 {
                return Err(Error::CorruptData(
                    "file length is not a positive multiple of the chapter size".into(),
                ));
            }
            inner.chapter_count = (len / (PAGES_PER_CHAPTER as u64 * PAGE_SIZE as u64)) as u32;
            let page0 = inner.read_page(0)?;
            let header = FileHeader::parse(&page0)?;
            inner.first_free_page = header.first_free_page;
            debug!(
                chapters = inner.chapter_count,
                first_free_page = inner.first_free_page,
                "opened existing compound file"
            );
        }

        Ok(Store {
            inner: Mutex::new(inner),
        })
    }

    /// Reserves a chain of pages able to hold `size` bytes and returns its
    /// handle. The stream's length is established by the first call to
    /// [`Store::write`].
    pub fn allocate(&self, size: u32) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        let handle = inner.allocate_chain(size)?;
        inner.flush_if_needed()?;
        Ok(handle)
    }

    /// Releases every page belonging to `handle` back to the free list.
    pub fn free(&self, handle: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.check_handle_allocated(handle)?;
        inner.free_chain(handle)?;
        inner.flush_if_needed()?;
        Ok(())
    }

    /// Fully rewrites `handle`'s contents with `buf[off..off + count]`,
    /// trimming or growing the backing chain as needed.
    pub fn write(&self, handle: u32, buf: &[u8], off: usize, count: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.stream_write(handle, buf, off, count)?;
        inner.flush_if_needed()?;
        Ok(())
    }

    /// Writes `buf[off..off + count]` into `handle` at byte `position`,
    /// growing the stream if the write extends past its current length.
    pub fn write_at(
        &self,
        handle: u32,
        position: u32,
        buf: &[u8],
        off: usize,
        count: usize,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.stream_write_at(handle, position, buf, off, count)?;
        inner.flush_if_needed()?;
        Ok(())
    }

    /// Reads the entire contents of `handle`.
    pub fn read_all(&self, handle: u32) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.stream_read_all(handle)
    }

    /// Reads up to `count` bytes from `handle` starting at `src_off`,
    /// clamped to the stream's length, returning the number of bytes read.
    pub fn read_at(&self, handle: u32, buf: &mut [u8], src_off: u32, count: u32) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.stream_read_at(handle, buf, src_off, count)
    }

    /// Returns `handle`'s current stream length in bytes.
    pub fn length(&self, handle: u32) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.stream_length(handle)
    }

    /// Checks every page's checksum in the file, including the header.
    pub fn validate_crc(&self) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.validate_crc()
    }

    /// Durably flushes the backing file regardless of the configured
    /// options.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.file.sync_data()?;
        Ok(())
    }

    /// Writes the file header, flushes durably, and marks the store
    /// closed. Further operations return [`Error::AlreadyClosed`].
    pub fn close(self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_not_closed()?;
        inner.write_header_to_disk()?;
        inner.file.sync_data()?;
        inner.closed = true;
        Ok(())
    }
}

impl<F: BackingFile> Drop for Store<F> {
    fn drop(&mut self) {
        // Best-effort: if the caller never closed the store, try once to
        // leave the header consistent. Never panics or corrupts the file
        // if this fails; the documented contract is that callers close
        // explicitly.
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.closed {
                if inner.write_header_to_disk().is_ok() {
                    let _ = inner.file.sync_data();
                }
            }
        }
    }
}
