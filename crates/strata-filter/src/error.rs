use strata_common::error::CommonError;
use thiserror::Error;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FilterError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FilterError::InvalidArgument(message.into())
    }
}

impl From<CommonError> for FilterError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::InvalidConfig(message)
            | CommonError::InvalidArgument(message)
            | CommonError::NotSupported(message)
            | CommonError::InternalError(message) => FilterError::InvalidArgument(message),
        }
    }
}
