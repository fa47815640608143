use crate::progress::job_state::{JobState, ProgressSnapshot};
use crate::types::job_id::JobId;
use crate::types::job_request::WorkUnit;
use chrono::Utc;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Shared registry of job progress.
///
/// Clones share the same registry, so one tracker can be handed to every
/// running job and to whatever serves progress polls. Each call takes the lock
/// once, so a reader never sees a half-applied update. Calls naming an unknown
/// job, or a job that already finished, are logged and ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    jobs: Arc<RwLock<HashMap<JobId, JobState>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a job visible as pending before its totals are known.
    pub async fn register_job(&self, job_id: JobId) {
        let mut jobs = self.jobs.write().await;
        jobs.entry(job_id).or_insert_with(JobState::pending);
        info!("Registered job {}", job_id);
    }

    /// Sets the totals of a job, creating it if needed.
    pub async fn create_job(&self, job_id: JobId, total_years: usize, total_locations: usize) {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id).or_insert_with(JobState::pending);
        if state.status.is_terminal() {
            warn!("Job {} already {}, not resetting it", job_id, state.status);
            return;
        }
        state.size(total_years, total_locations);
        info!(
            "Job {}: {} year(s) x {} location(s) = {} unit(s)",
            job_id, total_years, total_locations, state.total_units
        );
    }

    pub async fn update_download_progress(&self, job_id: JobId, unit: WorkUnit) {
        self.update(job_id, |state| {
            state.record_download(unit.year, unit.location_id);
            info!(
                "Job {}: downloaded {} ({}/{}, {:.1}%)",
                job_id,
                unit,
                state.completed_downloads,
                state.total_units,
                state.download_progress
            );
        })
        .await;
    }

    pub async fn update_conversion_progress(&self, job_id: JobId, unit: WorkUnit) {
        self.update(job_id, |state| {
            state.record_conversion(unit.year, unit.location_id);
            info!(
                "Job {}: converted {} ({}/{}, {:.1}%)",
                job_id,
                unit,
                state.completed_conversions,
                state.total_units,
                state.conversion_progress
            );
        })
        .await;
    }

    pub async fn complete_job(&self, job_id: JobId) {
        self.update(job_id, |state| {
            state.complete();
            info!("Job {} completed", job_id);
        })
        .await;
    }

    pub async fn fail_job(&self, job_id: JobId, message: impl Into<String>) {
        let message = message.into();
        self.update(job_id, |state| {
            error!("Job {} failed: {}", job_id, message);
            state.fail(message);
        })
        .await;
    }

    /// `None` for a job this tracker has never seen (or has evicted).
    pub async fn get_progress(&self, job_id: JobId) -> Option<ProgressSnapshot> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).map(|state| ProgressSnapshot {
            job_id,
            state: state.clone(),
        })
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drops finished jobs created at least `max_age` ago. Running jobs are
    /// never evicted. Returns how many were dropped.
    pub async fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, state| {
            let expired = (now - state.created_at)
                .to_std()
                .is_ok_and(|age| age >= max_age);
            !(state.status.is_terminal() && expired)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!("Evicted {} finished job(s) from the progress tracker", removed);
        }
        removed
    }

    async fn update(&self, job_id: JobId, apply: impl FnOnce(&mut JobState)) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            None => warn!("Job {} not found in progress tracker", job_id),
            Some(state) if state.status.is_terminal() => {
                warn!("Job {} already {}, ignoring update", job_id, state.status)
            }
            Some(state) => apply(state),
        }
    }
}
