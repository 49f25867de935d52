//! Page codec: the byte-exact layout of a single 4096-byte page and the
//! helpers to read, write, and checksum one.

use static_assertions::const_assert_eq;
use zerocopy::byteorder::{U32, LE};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Total size of a page, including header and trailing crc.
pub const PAGE_SIZE: usize = 4096;
/// Bytes available to a stream in every page.
pub const PAGE_DATA_SIZE: usize = 4083;
/// Size of the fixed header at the front of every page.
pub const PAGE_HEADER_SIZE: usize = 9;
/// Offset of the trailing crc within a page.
pub const CRC_OFFSET: usize = PAGE_SIZE - 4;

/// Page status byte: the page is part of an allocated stream chain.
pub const STATUS_ALLOCATED: u8 = 0;
/// Page status byte: the page is on the free list.
pub const STATUS_FREE: u8 = 1;

/// The fixed-size header every page starts with.
///
/// `status` is the sole authority on whether a page is allocated or free;
/// nothing else in this crate ever inspects `link` to make that decision.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct RawPageHeader {
    pub status: u8,
    pub link: U32<LE>,
    pub length: U32<LE>,
}

const_assert_eq!(std::mem::size_of::<RawPageHeader>(), PAGE_HEADER_SIZE);

/// Decoded view of a page's header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub status: u8,
    pub link: u32,
    pub length: u32,
}

impl PageHeader {
    pub fn is_free(&self) -> bool {
        self.status == STATUS_FREE
    }
}

/// Reads the header fields out of a full page buffer.
pub fn read_header(page: &[u8; PAGE_SIZE]) -> PageHeader {
    let raw = RawPageHeader::ref_from_prefix(&page[..]).expect("page buffer too short");
    PageHeader {
        status: raw.status,
        link: raw.link.get(),
        length: raw.length.get(),
    }
}

/// Writes the header fields into a full page buffer. Does not touch the
/// crc; callers must call [`recompute_crc`] afterwards.
pub fn write_header(page: &mut [u8; PAGE_SIZE], status: u8, link: u32, length: u32) {
    let raw = RawPageHeader {
        status,
        link: U32::new(link),
        length: U32::new(length),
    };
    page[..PAGE_HEADER_SIZE].copy_from_slice(raw.as_bytes());
}

/// Rewrites only the `link` field in place, leaving `status` and `length`
/// untouched. Does not recompute the crc.
pub fn write_link(page: &mut [u8; PAGE_SIZE], link: u32) {
    page[1..5].copy_from_slice(&link.to_le_bytes());
}

/// Rewrites only the `length` field in place. Does not recompute the crc.
pub fn write_length(page: &mut [u8; PAGE_SIZE], length: u32) {
    page[5..9].copy_from_slice(&length.to_le_bytes());
}

/// Immutable view of a page's 4083-byte data region.
pub fn data(page: &[u8; PAGE_SIZE]) -> &[u8] {
    &page[PAGE_HEADER_SIZE..CRC_OFFSET]
}

/// Mutable view of a page's 4083-byte data region.
pub fn data_mut(page: &mut [u8; PAGE_SIZE]) -> &mut [u8] {
    &mut page[PAGE_HEADER_SIZE..CRC_OFFSET]
}

/// Computes the crc32 over everything in the page except the trailing crc
/// field itself.
pub fn compute_crc(page: &[u8; PAGE_SIZE]) -> u32 {
    crc32fast::hash(&page[..CRC_OFFSET])
}

/// Recomputes and stores the page's trailing crc. Must be called after any
/// in-place mutation of a page buffer.
pub fn recompute_crc(page: &mut [u8; PAGE_SIZE]) {
    let crc = compute_crc(page);
    page[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
}

/// Reads the crc stored in the page's trailer.
pub fn stored_crc(page: &[u8; PAGE_SIZE]) -> u32 {
    u32::from_le_bytes(page[CRC_OFFSET..].try_into().unwrap())
}

/// Whether the page's stored crc matches its actual contents.
pub fn crc_is_valid(page: &[u8; PAGE_SIZE]) -> bool {
    stored_crc(page) == compute_crc(page)
}

/// Number of pages a stream of `length` bytes occupies. A zero-length
/// stream still occupies exactly one page.
pub fn num_pages_for_length(length: u32) -> u32 {
    if length == 0 {
        return 1;
    }
    let length = length as u64;
    let data_size = PAGE_DATA_SIZE as u64;
    (((length + data_size - 1) / data_size) as u32).max(1)
}
