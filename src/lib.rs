//! A paged compound file store: many independently-allocated, variably
//! sized byte streams ("embedded files") multiplexed into a single host
//! file, each addressed by an opaque 32-bit handle.
//!
//! The host file is divided into fixed 4096-byte pages, grouped into
//! 16 MiB chapters. Free pages form a singly-linked list rooted in the
//! file header; an allocated stream is its own singly-linked chain of
//! pages. Every page carries a trailing crc32 so corruption can be
//! detected page-by-page or across the whole file via
//! [`Store::validate_crc`].
//!
//! ```no_run
//! use unicornfs::{Options, Store};
//! use std::path::Path;
//!
//! let store = Store::open(Path::new("example.ufs"), Options::default())?;
//! let handle = store.allocate(11)?;
//! store.write(handle, b"hello world", 0, 11)?;
//! assert_eq!(store.read_all(handle)?, b"hello world");
//! store.close()?;
//! # Ok::<(), unicornfs::Error>(())
//! ```

#![forbid(unsafe_code)]

mod backing;
mod chapter;
mod error;
mod freelist;
mod header;
mod page;
mod store;
mod stream;
mod verify;

#[cfg(test)]
mod tests;

pub use backing::BackingFile;
pub use error::{Error, Result};
pub use store::{Options, Store};
