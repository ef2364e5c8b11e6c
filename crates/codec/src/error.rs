use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("key mismatch: no page of {path} authenticated")]
    KeyMismatch { path: PathBuf },

    #[error("unrecognized shard format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid cipher parameters: {0}")]
    InvalidParams(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
