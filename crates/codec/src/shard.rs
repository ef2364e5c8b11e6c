use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::DecryptError;
use crate::key::DecryptionKey;
use crate::page::PageKeys;
use crate::params::{CipherParams, SALT_LEN, SQLITE_MAGIC};

/// Outcome of decrypting one shard. Pages that failed authentication were
/// written as zeros and are listed by 1-based page number.
#[derive(Debug, Clone)]
pub struct DecryptReport {
    pub pages: u32,
    pub failed_pages: Vec<u32>,
    /// blake3 digest of the written plaintext.
    pub digest: blake3::Hash,
}

impl DecryptReport {
    pub fn pages_ok(&self) -> u32 {
        self.pages - self.failed_pages.len() as u32
    }

    pub fn is_clean(&self) -> bool {
        self.failed_pages.is_empty()
    }
}

/// Decrypt `input` into `output` with the vendor's default parameters.
pub fn decrypt(
    key: &DecryptionKey,
    input: &Path,
    output: &Path,
) -> Result<DecryptReport, DecryptError> {
    decrypt_with(key, input, output, &CipherParams::default())
}

pub fn decrypt_with(
    key: &DecryptionKey,
    input: &Path,
    output: &Path,
    params: &CipherParams,
) -> Result<DecryptReport, DecryptError> {
    params.validate()?;
    let format_error = |reason: String| DecryptError::Format {
        path: input.to_path_buf(),
        reason,
    };

    let file = File::open(input)?;
    let len = file.metadata()?.len();
    let page_size = params.page_size as u64;
    if len < page_size {
        return Err(format_error(format!("{len} bytes is shorter than one page")));
    }
    if len % page_size != 0 {
        return Err(format_error(format!(
            "{len} bytes is not a multiple of the {page_size} byte page size"
        )));
    }
    let pages = u32::try_from(len / page_size)
        .map_err(|_| format_error(format!("{len} bytes holds too many pages")))?;

    let mut reader = BufReader::new(file);
    let mut page = vec![0u8; params.page_size];
    reader.read_exact(&mut page)?;
    if page.starts_with(SQLITE_MAGIC) {
        return Err(format_error("file is already plaintext".into()));
    }

    let keys = PageKeys::derive(key, &page[..SALT_LEN], params.kdf_iterations);

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(staged.as_file());
    let mut hasher = blake3::Hasher::new();
    let mut failed_pages = Vec::new();

    for pgno in 1..=pages {
        if pgno > 1 {
            reader.read_exact(&mut page)?;
        }
        if open_page(&keys, params, pgno, &mut page)? {
            if pgno == 1 {
                check_header(params, &page).map_err(format_error)?;
            }
        } else {
            debug!(path = %input.display(), pgno, "page failed authentication");
            failed_pages.push(pgno);
        }
        writer.write_all(&page)?;
        hasher.update(&page);
    }

    if failed_pages.len() as u32 == pages {
        return Err(DecryptError::KeyMismatch {
            path: input.to_path_buf(),
        });
    }

    writer.flush()?;
    drop(writer);
    staged.as_file().sync_all()?;
    staged.persist(output).map_err(|e| DecryptError::Io(e.error))?;

    if !failed_pages.is_empty() {
        warn!(
            path = %input.display(),
            failed = failed_pages.len(),
            pages,
            "shard decrypted with corrupt pages"
        );
    }
    info!(path = %input.display(), pages, "shard decrypted");

    Ok(DecryptReport {
        pages,
        failed_pages,
        digest: hasher.finalize(),
    })
}

/// Authenticate and decrypt one page in place. A page that fails its tag is
/// zeroed instead, keeping only the file magic on page 1.
fn open_page(
    keys: &PageKeys,
    params: &CipherParams,
    pgno: u32,
    page: &mut [u8],
) -> Result<bool, DecryptError> {
    let authentic = keys.verify(
        pgno,
        &page[params.authenticated_range(pgno)],
        &page[params.tag_range()],
    )?;

    if authentic {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&page[params.iv_range()]);
        keys.decrypt_body(&iv, &mut page[params.body_range(pgno)])?;
    } else {
        page.fill(0);
    }
    if pgno == 1 {
        page[..SQLITE_MAGIC.len()].copy_from_slice(SQLITE_MAGIC);
    }
    Ok(authentic)
}

/// The decrypted database header must describe the geometry we decrypted with.
fn check_header(params: &CipherParams, page: &[u8]) -> Result<(), String> {
    let declared = match u16::from_be_bytes([page[16], page[17]]) {
        1 => 65_536,
        n => n as usize,
    };
    if declared != params.page_size {
        return Err(format!(
            "header declares page size {declared}, expected {}",
            params.page_size
        ));
    }
    let reserve = page[20] as usize;
    if reserve != params.reserve_size {
        return Err(format!(
            "header declares {reserve} reserved bytes, expected {}",
            params.reserve_size
        ));
    }
    Ok(())
}
