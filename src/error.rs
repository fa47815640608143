use crate::archive::error::ArchiveError;
use crate::epw::error::ConversionError;
use crate::jobs::error::JobError;
use crate::storage::error::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenWeatherError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Failed to load settings from the environment")]
    Config(#[from] envy::Error),
}
