use std::path::Path;

use aes::Aes256;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use chatvault_codec::params::{IV_LEN, SALT_LEN, SQLITE_MAGIC};
use chatvault_codec::{CipherParams, DecryptionKey, PageKeys};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

pub fn random_key() -> DecryptionKey {
    DecryptionKey::from_bytes(rand::random())
}

/// Vendor geometry with a KDF cheap enough for tests.
pub fn test_params() -> CipherParams {
    CipherParams {
        kdf_iterations: 2,
        ..CipherParams::default()
    }
}

/// Encrypt a plaintext database image the way the vendor stores shards: a fresh
/// random salt in place of the file magic, a random IV per page, and an
/// HMAC-SHA1 tag bound to the page number.
pub fn seal_bytes(
    key: &DecryptionKey,
    plaintext: &[u8],
    params: &CipherParams,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if plaintext.is_empty() || plaintext.len() % params.page_size != 0 {
        return Err(format!("{} bytes is not a whole number of pages", plaintext.len()).into());
    }
    let salt: [u8; SALT_LEN] = rand::random();
    let keys = PageKeys::derive(key, &salt, params.kdf_iterations);

    let mut sealed = plaintext.to_vec();
    for (index, page) in sealed.chunks_mut(params.page_size).enumerate() {
        let pgno = index as u32 + 1;
        if pgno == 1 {
            page[..SALT_LEN].copy_from_slice(&salt);
        }
        let iv: [u8; IV_LEN] = rand::random();
        page[params.iv_range()].copy_from_slice(&iv);

        let body = &mut page[params.body_range(pgno)];
        let len = body.len();
        Aes256CbcEnc::new_from_slices(keys.cipher_key(), &iv)
            .map_err(|e| format!("aes init: {e:?}"))?
            .encrypt_padded_mut::<NoPadding>(body, len)
            .map_err(|e| format!("page {pgno}: {e:?}"))?;

        let tag = keys.page_tag(pgno, &page[params.authenticated_range(pgno)])?;
        page[params.tag_range()].copy_from_slice(&tag);
    }
    Ok(sealed)
}

pub fn seal_database(
    key: &DecryptionKey,
    plaintext: &Path,
    sealed: &Path,
    params: &CipherParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(plaintext)?;
    std::fs::write(sealed, seal_bytes(key, &bytes, params)?)?;
    Ok(())
}

/// A plaintext image of `pages` pages whose header matches `params`, with a
/// recognisable fill so decrypted bodies can be compared.
pub fn synthetic_plaintext(pages: u32, params: &CipherParams) -> Vec<u8> {
    let mut image = vec![0u8; pages as usize * params.page_size];
    for (index, page) in image.chunks_mut(params.page_size).enumerate() {
        let fill = index as u8 ^ 0x5a;
        page[params.body_range(index as u32 + 1)].fill(fill);
    }
    image[..SQLITE_MAGIC.len()].copy_from_slice(SQLITE_MAGIC);
    let declared = if params.page_size == 65_536 {
        1u16
    } else {
        params.page_size as u16
    };
    image[16..18].copy_from_slice(&declared.to_be_bytes());
    image[20] = params.reserve_size as u8;
    image
}
