use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid time range {value:?}: {reason}")]
    InvalidTimeRange { value: String, reason: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("config error: {0}")]
    Config(String),
}
