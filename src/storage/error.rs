use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create output root '{0}'")]
    CreateRoot(PathBuf, #[source] std::io::Error),

    #[error("Failed to create job directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),

    #[error("No free job directory name for '{base}' after {attempts} attempts")]
    NameExhausted { base: String, attempts: u32 },

    #[error("Refusing to write file with unsafe name '{0}'")]
    InvalidFileName(String),

    #[error("Failed to write file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to list directory '{0}'")]
    List(PathBuf, #[source] std::io::Error),

    #[error("Failed to read metadata of '{0}'")]
    Metadata(PathBuf, #[source] std::io::Error),

    #[error("Background storage task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
