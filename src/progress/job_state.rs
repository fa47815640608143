use crate::types::job_id::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Converting,
    Completed,
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress of one job as tracked by [`crate::ProgressTracker`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobState {
    pub status: JobStatus,
    pub total_years: usize,
    pub total_locations: usize,
    pub total_units: usize,
    pub completed_downloads: usize,
    pub completed_conversions: usize,
    /// Percentages in `[0, 100]`.
    pub download_progress: f64,
    pub conversion_progress: f64,
    /// Last unit touched. For display only.
    pub current_year: Option<i32>,
    pub current_location: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobState {
    /// A job whose totals are not known yet.
    pub(crate) fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            total_years: 0,
            total_locations: 0,
            total_units: 0,
            completed_downloads: 0,
            completed_conversions: 0,
            download_progress: 0.0,
            conversion_progress: 0.0,
            current_year: None,
            current_location: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            error: None,
        }
    }

    /// Sets totals and resets counters. An empty unit set counts as done.
    pub(crate) fn size(&mut self, total_years: usize, total_locations: usize) {
        self.total_years = total_years;
        self.total_locations = total_locations;
        self.total_units = total_years * total_locations;
        self.completed_downloads = 0;
        self.completed_conversions = 0;
        self.download_progress = percent(0, self.total_units);
        self.conversion_progress = percent(0, self.total_units);
    }

    pub(crate) fn record_download(&mut self, year: i32, location_id: u64) {
        self.completed_downloads = (self.completed_downloads + 1).min(self.total_units);
        self.download_progress = percent(self.completed_downloads, self.total_units);
        self.current_year = Some(year);
        self.current_location = Some(location_id);
        self.status = JobStatus::Downloading;
    }

    pub(crate) fn record_conversion(&mut self, year: i32, location_id: u64) {
        self.completed_conversions = (self.completed_conversions + 1).min(self.total_units);
        self.conversion_progress = percent(self.completed_conversions, self.total_units);
        self.current_year = Some(year);
        self.current_location = Some(location_id);
        self.status = JobStatus::Converting;
    }

    pub(crate) fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.download_progress = 100.0;
        self.conversion_progress = 100.0;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.failed_at = Some(Utc::now());
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (count as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// What a poller receives for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    #[serde(flatten)]
    pub state: JobState,
}
