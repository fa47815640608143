use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("CSV file not found: '{0}'")]
    NotFound(PathBuf),

    #[error("Failed to read CSV file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse CSV file '{path}'")]
    Csv {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("CSV file '{0}' has no metadata and data sections")]
    MissingSections(PathBuf),

    #[error("Missing required column '{column}' in '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Missing metadata field '{field}' in '{path}'")]
    MissingMetadata { path: PathBuf, field: String },

    #[error("CSV file '{0}' contains no data rows")]
    NoRows(PathBuf),

    #[error("Invalid value '{value}' in column '{column}' of '{path}'")]
    InvalidValue {
        path: PathBuf,
        column: String,
        value: String,
    },

    #[error("Unsupported sampling interval of {minutes} minutes in '{path}', only hourly data can be converted")]
    UnsupportedInterval { path: PathBuf, minutes: i64 },

    #[error("CSV file '{path}' has {found} data rows, at least {expected} are needed for a full year")]
    InsufficientRows {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Failed building the weather table")]
    Frame(#[source] PolarsError),

    #[error("Failed to write EPW file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Background conversion task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Coarse classes of conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionErrorClass {
    /// The source file does not exist.
    NotFound,
    /// The source file exists but is not a usable NSRDB CSV.
    Format,
    /// Reading or writing failed at the filesystem level.
    Io,
}

impl ConversionError {
    pub fn class(&self) -> ConversionErrorClass {
        match self {
            ConversionError::NotFound(_) => ConversionErrorClass::NotFound,
            ConversionError::Read(..)
            | ConversionError::Write(..)
            | ConversionError::TaskJoin(_) => ConversionErrorClass::Io,
            ConversionError::Csv { .. }
            | ConversionError::MissingSections(_)
            | ConversionError::MissingColumn { .. }
            | ConversionError::MissingMetadata { .. }
            | ConversionError::NoRows(_)
            | ConversionError::InvalidValue { .. }
            | ConversionError::UnsupportedInterval { .. }
            | ConversionError::InsufficientRows { .. }
            | ConversionError::Frame(_) => ConversionErrorClass::Format,
        }
    }
}
