//! Whole-file integrity check.

use crate::backing::BackingFile;
use crate::error::Result;
use crate::page;
use crate::store::Inner;

impl<F: BackingFile> Inner<F> {
    /// Checks every page's crc, including the file header. Returns `false`
    /// at the first mismatch rather than collecting every offender.
    pub(crate) fn validate_crc(&mut self) -> Result<bool> {
        let total_pages = self.total_pages();
        for index in 0..total_pages {
            let page = self.read_page(index)?;
            if !page::crc_is_valid(&page) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
