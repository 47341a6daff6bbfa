use datafusion::arrow::error::ArrowError;
use thiserror::Error;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("error in Arrow IPC: {0}")]
    ArrowError(#[from] ArrowError),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl WireError {
    pub fn internal(message: impl Into<String>) -> Self {
        WireError::InternalError(message.into())
    }
}
