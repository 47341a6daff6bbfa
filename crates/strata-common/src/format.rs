use std::fmt;
use std::path::Path;

use crate::error::{CommonError, CommonResult};

/// A tabular file format recognized by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Parquet,
    /// The Arrow IPC file format, also known as Feather v2.
    ArrowFile,
    /// The Arrow IPC streaming format.
    ArrowStream,
}

impl FileFormat {
    /// Detects the format from the file extension, ignoring case.
    pub fn from_path(path: &Path) -> CommonResult<Self> {
        let extension = path
            .extension()
            .and_then(|x| x.to_str())
            .map(|x| x.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "tsv" => Ok(FileFormat::Tsv),
            "parquet" | "pq" => Ok(FileFormat::Parquet),
            "arrow" | "ipc" | "feather" => Ok(FileFormat::ArrowFile),
            "arrows" => Ok(FileFormat::ArrowStream),
            "" => Err(CommonError::unsupported(format!(
                "file has no extension: {}",
                path.display()
            ))),
            other => Err(CommonError::unsupported(format!(
                "unsupported file format: {other}"
            ))),
        }
    }

    /// The field delimiter for delimited text formats.
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            FileFormat::Csv => Some(b','),
            FileFormat::Tsv => Some(b'\t'),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Parquet => "parquet",
            FileFormat::ArrowFile => "arrow",
            FileFormat::ArrowStream => "arrows",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Parquet,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Parquet => f.write_str("parquet"),
        }
    }
}
