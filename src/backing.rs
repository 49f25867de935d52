//! The block-I/O facade this crate needs from a backing file.
//!
//! `sync_file::{ReadAt, WriteAt}` give positioned reads and writes but
//! nothing else; this format also needs to know the file's current length
//! (to derive `chapter_count`, which is never stored) and to ask for a
//! durable flush. [`BackingFile`] bundles all three.

use std::io;

use sync_file::{RandomAccessFile, ReadAt, WriteAt};

/// Everything the store needs from whatever is holding the bytes.
pub trait BackingFile: Send {
    /// Reads at most `buf.len()` bytes starting at `offset`, like `pread`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Writes at most `buf.len()` bytes starting at `offset`, like `pwrite`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Current length of the file in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Flushes written data to stable storage.
    fn sync_data(&self) -> io::Result<()>;

    /// Reads exactly `buf.len()` bytes, looping over short reads.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected end of file",
                    ))
                }
                n => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    /// Writes the whole buffer, looping over short writes.
    fn write_all_at(&self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, offset)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                n => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

impl BackingFile for RandomAccessFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        ReadAt::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        WriteAt::write_at(self, buf, offset)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.get_ref().metadata()?.len())
    }

    fn sync_data(&self) -> io::Result<()> {
        self.get_ref().sync_data()
    }
}
