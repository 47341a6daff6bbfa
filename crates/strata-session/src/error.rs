use std::fmt;

use datafusion::error::DataFusionError;
use serde::Serialize;
use strata_common::error::CommonError;
use strata_compute::error::ComputeError;
use strata_filter::error::FilterError;
use strata_store::error::StoreError;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// The broad area a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Data,
    File,
    Sql,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Data => "data",
            ErrorCategory::File => "file",
            ErrorCategory::Sql => "sql",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("engine error: {message}")]
    EngineError {
        category: ErrorCategory,
        message: String,
    },
    #[error("internal error: {0}")]
    InternalError(String),
}

impl SessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SessionError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SessionError::InternalError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SessionError::NotFound(message.into())
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        SessionError::AlreadyExists(message.into())
    }

    /// A stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "not_found",
            SessionError::AlreadyExists(_) => "already_exists",
            SessionError::UnsupportedFormat(_) => "unsupported_format",
            SessionError::InvalidArgument(_) => "invalid_argument",
            SessionError::IoError(_) => "io_error",
            SessionError::EngineError { .. } => "engine_error",
            SessionError::InternalError(_) => "internal_error",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotFound(_)
            | SessionError::AlreadyExists(_)
            | SessionError::InvalidArgument(_) => ErrorCategory::Data,
            SessionError::UnsupportedFormat(_) | SessionError::IoError(_) => ErrorCategory::File,
            SessionError::EngineError { category, .. } => *category,
            SessionError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code(),
            category: self.category(),
            message: self.to_string(),
        }
    }
}

/// The form in which every failure crosses the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorInfo {
    /// The mapping for failures that carry no classification of their own.
    pub fn internal(message: impl Into<String>) -> Self {
        ErrorInfo {
            code: "internal_error",
            category: ErrorCategory::Internal,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for ErrorInfo {
    fn from(error: &SessionError) -> Self {
        error.info()
    }
}

impl From<SessionError> for ErrorInfo {
    fn from(error: SessionError) -> Self {
        error.info()
    }
}

impl From<CommonError> for SessionError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::InvalidConfig(message) | CommonError::InvalidArgument(message) => {
                SessionError::InvalidArgument(message)
            }
            CommonError::NotSupported(message) => SessionError::UnsupportedFormat(message),
            CommonError::InternalError(message) => SessionError::InternalError(message),
        }
    }
}

impl From<FilterError> for SessionError {
    fn from(error: FilterError) -> Self {
        match error {
            FilterError::ColumnNotFound(column) => {
                SessionError::NotFound(format!("column {column}"))
            }
            FilterError::InvalidArgument(message) => SessionError::InvalidArgument(message),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuckDbError(e) => SessionError::EngineError {
                category: ErrorCategory::Sql,
                message: e.to_string(),
            },
            StoreError::ArrowError(e) => SessionError::EngineError {
                category: ErrorCategory::Sql,
                message: e.to_string(),
            },
            StoreError::WireError(e) => SessionError::InternalError(e.to_string()),
            StoreError::IoError(e) => SessionError::IoError(e),
            StoreError::InvalidArgument(message) => SessionError::InvalidArgument(message),
            StoreError::NotSupported(message) => SessionError::UnsupportedFormat(message),
            StoreError::InternalError(message) => SessionError::InternalError(message),
        }
    }
}

impl From<ComputeError> for SessionError {
    fn from(error: ComputeError) -> Self {
        match error {
            ComputeError::DataFusionError(DataFusionError::IoError(e)) => SessionError::IoError(e),
            ComputeError::DataFusionError(e) => SessionError::EngineError {
                category: ErrorCategory::Data,
                message: e.to_string(),
            },
            ComputeError::WireError(e) => SessionError::InternalError(e.to_string()),
            ComputeError::IoError(e) => SessionError::IoError(e),
            ComputeError::InvalidArgument(message) => SessionError::InvalidArgument(message),
            ComputeError::NotSupported(message) => SessionError::UnsupportedFormat(message),
            ComputeError::InternalError(message) => SessionError::InternalError(message),
        }
    }
}
