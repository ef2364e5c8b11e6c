use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::DecryptError;

pub const KEY_LEN: usize = 32;

/// The 256-bit master key shared by every shard of one session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DecryptionKey([u8; KEY_LEN]);

impl DecryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, DecryptError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| DecryptError::InvalidKey(format!("not hex: {e}")))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            DecryptError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let text = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let key = DecryptionKey::from_hex(text).unwrap();
        assert_eq!(hex::encode(key.as_bytes()), text);
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(matches!(
            DecryptionKey::from_hex("0011"),
            Err(DecryptError::InvalidKey(_))
        ));
        assert!(DecryptionKey::from_hex("zz").is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = DecryptionKey::from_bytes([7u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DecryptionKey(..)");
    }
}
