use std::ops::Range;

use chatvault_core::VaultConfig;

use crate::error::DecryptError;

pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 20;
const AES_BLOCK: usize = 16;

/// Page geometry and KDF cost of the vendor's at-rest format.
///
/// Each page ends with a reserve region holding the page IV followed by its
/// HMAC-SHA1 tag. Page 1 additionally starts with the KDF salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherParams {
    pub page_size: usize,
    pub reserve_size: usize,
    pub kdf_iterations: u32,
}

impl Default for CipherParams {
    fn default() -> Self {
        Self {
            page_size: 4096,
            reserve_size: 48,
            kdf_iterations: 64_000,
        }
    }
}

impl CipherParams {
    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            page_size: config.page_size,
            reserve_size: config.reserve_size,
            kdf_iterations: config.kdf_iterations,
        }
    }

    pub fn validate(&self) -> Result<(), DecryptError> {
        if !self.page_size.is_power_of_two() || !(512..=65_536).contains(&self.page_size) {
            return Err(DecryptError::InvalidParams(format!(
                "page size {} is not a power of two in 512..=65536",
                self.page_size
            )));
        }
        if self.reserve_size < IV_LEN + TAG_LEN || self.reserve_size > 255 {
            return Err(DecryptError::InvalidParams(format!(
                "reserve size {} cannot hold an iv and a tag",
                self.reserve_size
            )));
        }
        if (self.page_size - self.reserve_size - SALT_LEN) % AES_BLOCK != 0
            || (self.page_size - self.reserve_size) % AES_BLOCK != 0
        {
            return Err(DecryptError::InvalidParams(format!(
                "page body of {} bytes is not block aligned",
                self.page_size - self.reserve_size
            )));
        }
        if self.kdf_iterations == 0 {
            return Err(DecryptError::InvalidParams("kdf iterations must be non-zero".into()));
        }
        Ok(())
    }

    fn body_start(pgno: u32) -> usize {
        if pgno == 1 { SALT_LEN } else { 0 }
    }

    fn reserve_start(&self) -> usize {
        self.page_size - self.reserve_size
    }

    /// Encrypted region of page `pgno` (1-based).
    pub fn body_range(&self, pgno: u32) -> Range<usize> {
        Self::body_start(pgno)..self.reserve_start()
    }

    pub fn iv_range(&self) -> Range<usize> {
        self.reserve_start()..self.reserve_start() + IV_LEN
    }

    pub fn tag_range(&self) -> Range<usize> {
        let start = self.reserve_start() + IV_LEN;
        start..start + TAG_LEN
    }

    /// Bytes covered by the page tag: the ciphertext followed by the IV.
    pub fn authenticated_range(&self, pgno: u32) -> Range<usize> {
        Self::body_start(pgno)..self.reserve_start() + IV_LEN
    }
}
