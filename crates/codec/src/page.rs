use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::error::DecryptError;
use crate::key::{DecryptionKey, KEY_LEN};
use crate::params::TAG_LEN;

type HmacSha1 = Hmac<Sha1>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const MAC_SALT_MASK: u8 = 0x3a;
const MAC_KDF_ITERATIONS: u32 = 2;

/// Keys derived for one shard from the master key and that shard's salt.
pub struct PageKeys {
    cipher: Zeroizing<[u8; KEY_LEN]>,
    mac: Zeroizing<[u8; KEY_LEN]>,
}

impl PageKeys {
    pub fn derive(key: &DecryptionKey, salt: &[u8], iterations: u32) -> Self {
        let mut cipher = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha1>(key.as_bytes(), salt, iterations, &mut cipher[..]);

        let mac_salt: Vec<u8> = salt.iter().map(|b| b ^ MAC_SALT_MASK).collect();
        let mut mac = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha1>(&cipher[..], &mac_salt, MAC_KDF_ITERATIONS, &mut mac[..]);

        Self { cipher, mac }
    }

    pub fn cipher_key(&self) -> &[u8; KEY_LEN] {
        &self.cipher
    }

    fn page_mac(&self, pgno: u32, authenticated: &[u8]) -> Result<HmacSha1, DecryptError> {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(&self.mac[..])
            .map_err(|e| DecryptError::Cipher(format!("hmac init: {e}")))?;
        mac.update(authenticated);
        mac.update(&pgno.to_le_bytes());
        Ok(mac)
    }

    /// Tag of page `pgno` over its ciphertext and IV, bound to the page number.
    pub fn page_tag(&self, pgno: u32, authenticated: &[u8]) -> Result<[u8; TAG_LEN], DecryptError> {
        let digest = self.page_mac(pgno, authenticated)?.finalize().into_bytes();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest);
        Ok(tag)
    }

    /// Constant-time tag comparison.
    pub fn verify(&self, pgno: u32, authenticated: &[u8], tag: &[u8]) -> Result<bool, DecryptError> {
        Ok(self.page_mac(pgno, authenticated)?.verify_slice(tag).is_ok())
    }

    /// Decrypt a block-aligned page body in place.
    pub fn decrypt_body(&self, iv: &[u8], body: &mut [u8]) -> Result<(), DecryptError> {
        let cipher = Aes256CbcDec::new_from_slices(&self.cipher[..], iv)
            .map_err(|e| DecryptError::Cipher(format!("aes init: {e}")))?;
        cipher
            .decrypt_padded_mut::<NoPadding>(body)
            .map_err(|e| DecryptError::Cipher(format!("page body: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(salt: &[u8]) -> PageKeys {
        PageKeys::derive(&DecryptionKey::from_bytes([0x42; KEY_LEN]), salt, 8)
    }

    #[test]
    fn derivation_depends_on_salt() {
        let a = keys(&[1u8; 16]);
        let b = keys(&[2u8; 16]);
        assert_ne!(a.cipher_key(), b.cipher_key());
        assert_eq!(a.cipher_key(), keys(&[1u8; 16]).cipher_key());
    }

    #[test]
    fn tag_binds_page_number() {
        let k = keys(&[9u8; 16]);
        let body = vec![0xabu8; 64];
        let tag = k.page_tag(3, &body).unwrap();
        assert!(k.verify(3, &body, &tag).unwrap());
        assert!(!k.verify(4, &body, &tag).unwrap());

        let mut tampered = body.clone();
        tampered[10] ^= 1;
        assert!(!k.verify(3, &tampered, &tag).unwrap());
    }

    #[test]
    fn unaligned_body_is_cipher_error() {
        let k = keys(&[0u8; 16]);
        let mut body = vec![0u8; 15];
        assert!(matches!(
            k.decrypt_body(&[0u8; 16], &mut body),
            Err(DecryptError::Cipher(_))
        ));
    }
}
