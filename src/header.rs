//! File header codec. The header lives in page 0 and shares that page's
//! crc layout (the trailing 4 bytes of the page), so this module leans on
//! [`crate::page`] for the checksum machinery.

use static_assertions::const_assert_eq;
use zerocopy::byteorder::{U16, U32, LE};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::{Error, Result};
use crate::page::{self, PAGE_SIZE};

/// Identifies this file format. Stored NUL-padded to 50 bytes; a reader
/// only looks at the bytes up to the first NUL (or all 50, if there isn't
/// one).
pub const MAGIC: &[u8] = b"UNICORNS 4-LIFE";
const MAGIC_FIELD_LEN: usize = 50;

/// The only format version this crate knows how to read or write.
pub const CURRENT_VERSION: u16 = 1;

/// Page size this format always uses. Not configurable; stored so that a
/// future format revision could introduce a different value.
pub const FORMAT_PAGE_SIZE: u16 = 4096;

/// Pages per chapter. Not configurable, stored for the same reason.
pub const FORMAT_CHAPTER_SIZE: u16 = 4096;

#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
struct RawFileHeaderPrefix {
    magic: [u8; MAGIC_FIELD_LEN],
    version: U16<LE>,
    page_size: U16<LE>,
    chapter_size: U16<LE>,
    reserved: [u8; 4],
    first_free_page: U32<LE>,
}

const_assert_eq!(std::mem::size_of::<RawFileHeaderPrefix>(), 64);

/// Decoded contents of the file header in page 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub first_free_page: u32,
}

impl FileHeader {
    /// The header for a freshly initialized, single-chapter file: the
    /// free list starts at page 1 (page 0 is the header itself).
    pub fn new() -> Self {
        FileHeader { first_free_page: 1 }
    }

    /// Parses and validates the header out of page 0's raw bytes.
    pub fn parse(page: &[u8; PAGE_SIZE]) -> Result<Self> {
        if !page::crc_is_valid(page) {
            return Err(Error::CorruptData("file header crc mismatch".into()));
        }
        let raw = RawFileHeaderPrefix::ref_from_prefix(&page[..])
            .expect("page buffer shorter than header prefix");

        let magic_len = raw
            .magic
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAGIC_FIELD_LEN);
        if &raw.magic[..magic_len] != MAGIC {
            return Err(Error::CorruptData("bad magic".into()));
        }

        let version = raw.version.get();
        if version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        if raw.page_size.get() != FORMAT_PAGE_SIZE {
            return Err(Error::CorruptData(format!(
                "unexpected page size {}",
                raw.page_size.get()
            )));
        }
        if raw.chapter_size.get() != FORMAT_CHAPTER_SIZE {
            return Err(Error::CorruptData(format!(
                "unexpected chapter size {}",
                raw.chapter_size.get()
            )));
        }

        Ok(FileHeader {
            first_free_page: raw.first_free_page.get(),
        })
    }

    /// Encodes this header into page 0's buffer and recomputes its crc.
    pub fn write_to(&self, page: &mut [u8; PAGE_SIZE]) {
        let mut magic = [0u8; MAGIC_FIELD_LEN];
        magic[..MAGIC.len()].copy_from_slice(MAGIC);

        let raw = RawFileHeaderPrefix {
            magic,
            version: U16::new(CURRENT_VERSION),
            page_size: U16::new(FORMAT_PAGE_SIZE),
            chapter_size: U16::new(FORMAT_CHAPTER_SIZE),
            reserved: [0; 4],
            first_free_page: U32::new(self.first_free_page),
        };
        page[..std::mem::size_of::<RawFileHeaderPrefix>()].copy_from_slice(raw.as_bytes());
        page::recompute_crc(page);
    }
}
