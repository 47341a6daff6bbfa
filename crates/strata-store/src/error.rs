use datafusion::arrow::error::ArrowError;
use strata_common::error::CommonError;
use strata_wire::error::WireError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error in DuckDB: {0}")]
    DuckDbError(#[from] duckdb::Error),
    #[error("error in Arrow: {0}")]
    ArrowError(#[from] ArrowError),
    #[error("error in wire encoding: {0}")]
    WireError(#[from] WireError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        StoreError::NotSupported(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::InternalError(message.into())
    }
}

impl From<CommonError> for StoreError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::InvalidConfig(message) | CommonError::InvalidArgument(message) => {
                StoreError::InvalidArgument(message)
            }
            CommonError::NotSupported(message) => StoreError::NotSupported(message),
            CommonError::InternalError(message) => StoreError::InternalError(message),
        }
    }
}
