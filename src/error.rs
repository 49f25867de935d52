//! Typed error taxonomy for the store.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while operating on a store.
///
/// Variants are never conflated: a bad handle is always [`Error::InvalidHandle`],
/// never [`Error::OutOfRange`], even though both can originate from a caller
/// passing a bogus argument.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was attempted after the store was closed.
    #[error("store is already closed")]
    AlreadyClosed,

    /// The handle is zero, points past the end of the file, or no longer
    /// names an allocated stream.
    #[error("invalid handle: {0}")]
    InvalidHandle(u32),

    /// A caller-supplied buffer or offset does not contain the byte range
    /// the operation needs.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The on-disk structure failed validation: a bad magic, a page crc
    /// mismatch, or `validate_crc` returning false during a verified read.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The file header names a format version newer than this crate knows
    /// how to read.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),

    /// Growing the file would require more pages than a 32-bit page index
    /// can address.
    #[error("store is out of space")]
    OutOfSpace,

    /// The backing file reported an I/O error.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}
