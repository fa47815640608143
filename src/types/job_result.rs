//! The outcome of a job, as handed back to front ends.

use crate::types::job_id::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Result of running a job to completion or failure.
///
/// Serializes with a `"status"` tag of `"success"` or `"failure"`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success(JobSuccess),
    Failure(JobFailure),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobResult::Success(success) => Some(success.job_id),
            JobResult::Failure(failure) => failure.job_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSuccess {
    pub job_id: JobId,
    pub directory: PathBuf,
    pub files: JobFiles,
    pub summary: JobSummary,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    /// Absent when the job was rejected before an identifier was issued.
    pub job_id: Option<JobId>,
    pub kind: FailureKind,
    pub errors: Vec<String>,
    pub logs: Vec<String>,
}

/// Classification of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request was rejected before anything happened.
    Validation,
    /// The archive answered the location lookup with an unexpected payload.
    Discovery,
    /// A request to the archive failed or timed out.
    Fetch,
    /// A downloaded file could not be converted.
    Conversion,
    /// The output directory could not be written or read.
    Storage,
}

/// Files of a job directory grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobFiles {
    pub csv: Vec<PathBuf>,
    pub epw: Vec<PathBuf>,
    pub all: Vec<PathBuf>,
}

/// Size and type summary of a job directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_dir: PathBuf,
    pub job_name: String,
    pub total_files: usize,
    pub csv_files: usize,
    pub epw_files: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub created: Option<DateTime<Utc>>,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    /// Lowercased extension including the dot, e.g. `".epw"`. Empty when the
    /// file has no extension.
    pub file_type: String,
}
