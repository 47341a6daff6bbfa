use datafusion::error::DataFusionError;
use strata_common::error::CommonError;
use strata_wire::error::WireError;
use thiserror::Error;

pub type ComputeResult<T> = Result<T, ComputeError>;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("error in DataFusion: {0}")]
    DataFusionError(#[from] DataFusionError),
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

impl ComputeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ComputeError::InvalidArgument(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        ComputeError::NotSupported(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ComputeError::InternalError(message.into())
    }
}

impl From<CommonError> for ComputeError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::InvalidConfig(message) | CommonError::InvalidArgument(message) => {
                ComputeError::InvalidArgument(message)
            }
            CommonError::NotSupported(message) => ComputeError::NotSupported(message),
            CommonError::InternalError(message) => ComputeError::InternalError(message),
        }
    }
}
