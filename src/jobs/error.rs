use crate::archive::error::ArchiveError;
use crate::epw::error::ConversionError;
use crate::storage::error::StorageError;
use crate::types::job_request::WorkUnit;
use crate::types::job_result::FailureKind;
use crate::utils::error_chain;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid request: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("NSRDB API returned an invalid response. This could be due to an invalid API key, incorrect dataset name, or API service issues.")]
    Discovery(#[source] ArchiveError),

    #[error("Location lookup failed")]
    Lookup(#[source] ArchiveError),

    #[error("Failed to fetch {unit}")]
    Fetch {
        unit: WorkUnit,
        #[source]
        source: ArchiveError,
    },

    #[error("Failed to convert {unit}")]
    Conversion {
        unit: WorkUnit,
        #[source]
        source: ConversionError,
    },

    #[error("Output storage failed")]
    Storage(#[from] StorageError),
}

impl JobError {
    /// Splits a discovery failure into "the archive answered nonsense" and
    /// "the archive could not be reached".
    pub(crate) fn from_discovery(error: ArchiveError) -> Self {
        if error.is_discovery_format() {
            JobError::Discovery(error)
        } else {
            JobError::Lookup(error)
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::Validation(_) => FailureKind::Validation,
            JobError::Discovery(_) => FailureKind::Discovery,
            JobError::Lookup(_) | JobError::Fetch { .. } => FailureKind::Fetch,
            JobError::Conversion { .. } => FailureKind::Conversion,
            JobError::Storage(_) => FailureKind::Storage,
        }
    }

    /// Error lines for a failure result. Validation keeps one line per problem.
    pub fn messages(&self) -> Vec<String> {
        match self {
            JobError::Validation(errors) => errors.clone(),
            other => vec![error_chain(other)],
        }
    }

    /// The unit that was being processed, if any.
    pub fn unit(&self) -> Option<WorkUnit> {
        match self {
            JobError::Fetch { unit, .. } | JobError::Conversion { unit, .. } => Some(*unit),
            _ => None,
        }
    }
}
