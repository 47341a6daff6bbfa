use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        CommonError::InvalidConfig(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CommonError::InvalidArgument(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CommonError::NotSupported(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CommonError::InternalError(message.into())
    }
}

impl From<figment::Error> for CommonError {
    fn from(error: figment::Error) -> Self {
        CommonError::InvalidConfig(error.to_string())
    }
}
