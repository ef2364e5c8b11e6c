use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("archive unavailable at {path}: {reason}")]
    Precondition { path: PathBuf, reason: String },

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("core error: {0}")]
    Core(#[from] chatvault_core::CoreError),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no base shard supplied")]
    NoBase,

    #[error("base shard {path} unreadable: {reason}")]
    BaseUnreadable { path: PathBuf, reason: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
