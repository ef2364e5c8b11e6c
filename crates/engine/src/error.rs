use std::path::PathBuf;

use chatvault_codec::DecryptError;
use chatvault_core::CoreError;
use chatvault_storage::{MergeError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid time range {value:?}: {reason}")]
    InvalidTimeRange { value: String, reason: String },

    #[error("archive unavailable at {path}: {reason}")]
    Precondition { path: PathBuf, reason: String },

    #[error("export cancelled")]
    Cancelled,

    #[error("core error: {0}")]
    Core(CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for ExportError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTimeRange { value, reason } => {
                ExportError::InvalidTimeRange { value, reason }
            }
            other => ExportError::Core(other),
        }
    }
}
