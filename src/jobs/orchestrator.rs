//! The job pipeline: validate, claim a directory, resolve locations, then
//! fetch and convert every unit of work in turn.

use crate::archive::client::{Archive, ArchiveQuery, NsrdbArchive};
use crate::archive::error::ArchiveError;
use crate::config::Settings;
use crate::epw::converter::convert_csv_to_epw_async;
use crate::geometry::{GeometryValidator, WktGeometry};
use crate::jobs::error::JobError;
use crate::jobs::validation::{validate_request, PreparedJob};
use crate::progress::job_state::ProgressSnapshot;
use crate::progress::tracker::ProgressTracker;
use crate::storage::error::StorageError;
use crate::storage::output_store::{JobDirectory, OutputStore};
use crate::types::job_id::JobId;
use crate::types::job_request::{work_units, JobRequest, WorkUnit};
use crate::types::job_result::{JobFailure, JobResult, JobSuccess};
use bon::bon;
use log::{error, info};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};

/// A job that passed validation and owns a directory and a tracker entry.
struct AdmittedJob {
    job_id: JobId,
    directory: JobDirectory,
    prepared: PreparedJob,
}

/// Handle to a job running in the background.
///
/// Dropping the handle (or calling [`JobHandle::detach`]) leaves the job
/// running; its progress stays observable through the tracker.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    directory: PathBuf,
    task: JoinHandle<JobResult>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Waits for the job to finish. Errors only if the job task panicked.
    pub async fn join(self) -> Result<JobResult, JoinError> {
        self.task.await
    }

    /// Lets the job run on unobserved and returns its identifier for polling.
    pub fn detach(self) -> JobId {
        self.job_id
    }
}

/// Counts reported by [`Orchestrator::cleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub jobs_evicted: usize,
    pub directories_removed: usize,
}

/// Drives NSRDB download jobs from request to files on disk.
///
/// Units of a job run strictly one after another, with the configured
/// cooldown after each, so a job never has more than one request in flight
/// against the archive. Separate jobs are independent and may run
/// concurrently; they share only the [`ProgressTracker`].
///
/// # Examples
///
/// ```rust,no_run
/// # use openweather::{JobRequest, Orchestrator, OpenWeatherError, Settings};
/// # async fn run() -> Result<(), OpenWeatherError> {
/// let orchestrator = Orchestrator::nsrdb(Settings::from_env()?)?;
/// let request = JobRequest::builder()
///     .wkt("POINT(-76.5 42.4)")
///     .dataset("aggregated")
///     .interval("60")
///     .years(vec!["2022".to_string()])
///     .api_key("my-key")
///     .email("me@example.com")
///     .location("Ithaca")
///     .build();
/// let result = orchestrator.run(request).await;
/// println!("{}", serde_json::to_string_pretty(&result).unwrap());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator<A, G = WktGeometry> {
    settings: Settings,
    store: OutputStore,
    tracker: ProgressTracker,
    archive: A,
    geometry: G,
    /// Directories of admitted jobs that have not finished yet.
    running: Mutex<HashMap<JobId, PathBuf>>,
}

impl Orchestrator<NsrdbArchive, WktGeometry> {
    /// An orchestrator talking to the real NSRDB API, configured from `settings`.
    pub fn nsrdb(settings: Settings) -> Result<Self, ArchiveError> {
        let archive = NsrdbArchive::new(
            settings.api_base_url.clone(),
            settings.discovery_url.clone(),
            settings.fetch_timeout(),
        )?;
        Ok(Self::builder()
            .settings(settings)
            .archive(archive)
            .geometry(WktGeometry)
            .build())
    }
}

#[bon]
impl<A: Archive, G: GeometryValidator> Orchestrator<A, G> {
    /// Assembles an orchestrator from its collaborators.
    ///
    /// Pass `tracker` to share one progress registry between several
    /// orchestrators; otherwise a fresh one is created.
    #[builder]
    pub fn new(settings: Settings, archive: A, geometry: G, tracker: Option<ProgressTracker>) -> Self {
        Self {
            store: OutputStore::new(settings.outputs_dir.clone()),
            tracker: tracker.unwrap_or_default(),
            settings,
            archive,
            geometry,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current progress of a job, `None` if unknown.
    pub async fn progress(&self, job_id: JobId) -> Option<ProgressSnapshot> {
        self.tracker.get_progress(job_id).await
    }

    /// Checks a request without side effects, returning every problem found.
    pub fn validate(&self, request: &JobRequest) -> Result<PreparedJob, Vec<String>> {
        validate_request(request, &self.geometry)
    }

    /// Runs a job to completion on the current task and returns its result.
    pub async fn run(&self, request: JobRequest) -> JobResult {
        let job_id = JobId::new();
        match self.admit(job_id, &request).await {
            Ok(job) => self.execute(job).await,
            Err(e) => {
                let job_id = (!matches!(e, JobError::Validation(_))).then_some(job_id);
                JobResult::Failure(JobFailure {
                    job_id,
                    kind: e.kind(),
                    errors: e.messages(),
                    logs: Vec::new(),
                })
            }
        }
    }

    /// Validates the request, claims its directory and spawns the job.
    ///
    /// The returned handle carries the job id immediately; the job's state is
    /// `pending` in the tracker by the time this returns.
    pub async fn start(self: &Arc<Self>, request: JobRequest) -> Result<JobHandle, JobError>
    where
        A: 'static,
        G: 'static,
    {
        let job_id = JobId::new();
        let job = self.admit(job_id, &request).await?;
        let directory = job.directory.path.clone();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.execute(job).await });
        Ok(JobHandle {
            job_id,
            directory,
            task,
        })
    }

    /// Evicts finished jobs from the tracker and removes job directories at
    /// least `max_age` old. Directories of jobs still running are kept
    /// whatever their age.
    pub async fn cleanup(&self, max_age: Duration) -> Result<CleanupReport, StorageError> {
        let jobs_evicted = self.tracker.cleanup_old_jobs(max_age).await;
        // Held for the whole sweep so no job is admitted into a directory
        // that is about to be removed.
        let running = self.running.lock().await;
        let keep: HashSet<PathBuf> = running.values().cloned().collect();
        let directories_removed = self.store.cleanup_old_jobs(max_age, &keep).await?;
        drop(running);
        Ok(CleanupReport {
            jobs_evicted,
            directories_removed,
        })
    }

    /// [`Orchestrator::cleanup`] with the configured job retention.
    pub async fn cleanup_expired(&self) -> Result<CleanupReport, StorageError> {
        self.cleanup(self.settings.job_retention()).await
    }

    async fn admit(&self, job_id: JobId, request: &JobRequest) -> Result<AdmittedJob, JobError> {
        let prepared = self.validate(request).map_err(JobError::Validation)?;
        self.tracker.register_job(job_id).await;
        let mut running = self.running.lock().await;
        match self.store.create_job_directory(&prepared.labels).await {
            Ok(directory) => {
                running.insert(job_id, directory.path.clone());
                info!("Job {} accepted, writing to {}", job_id, directory.path.display());
                Ok(AdmittedJob {
                    job_id,
                    directory,
                    prepared,
                })
            }
            Err(e) => {
                drop(running);
                let e = JobError::from(e);
                self.tracker.fail_job(job_id, e.messages().join("; ")).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, job: AdmittedJob) -> JobResult {
        let prepared = &job.prepared;
        let years: Vec<String> = prepared.years.iter().map(i32::to_string).collect();
        let mut logs = vec![
            format!("Job started at: {}", job.directory.path.display()),
            format!("WKT: {}", prepared.location_seed),
            format!("Dataset: {}", prepared.dataset),
            format!("Interval: {}", prepared.interval),
            format!("Years: {}", years.join(", ")),
            format!(
                "Location: {}, {}, {}",
                prepared.labels.location, prepared.labels.region, prepared.labels.country
            ),
        ];

        let outcome = match self.process(&job, &mut logs).await {
            Ok(()) => self.collect(&job, &mut logs).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(result) => {
                self.tracker.complete_job(job.job_id).await;
                result
            }
            Err(e) => {
                let messages = e.messages();
                match e.unit() {
                    Some(unit) => error!("Job {} failed on {}: {}", job.job_id, unit, messages.join("; ")),
                    None => error!("Job {} failed: {}", job.job_id, messages.join("; ")),
                }
                self.tracker.fail_job(job.job_id, messages.join("; ")).await;
                logs.push("Job failed".to_string());
                JobResult::Failure(JobFailure {
                    job_id: Some(job.job_id),
                    kind: e.kind(),
                    errors: messages,
                    logs,
                })
            }
        };
        self.running.lock().await.remove(&job.job_id);
        result
    }

    async fn process(&self, job: &AdmittedJob, logs: &mut Vec<String>) -> Result<(), JobError> {
        let prepared = &job.prepared;
        let query = prepared.query();

        let location_ids = self
            .archive
            .discover_locations(&prepared.location_seed, &query)
            .await
            .map_err(JobError::from_discovery)?;
        logs.push(format!("Resolved {} location(s)", location_ids.len()));

        let units = work_units(&prepared.years, &location_ids);
        self.tracker
            .create_job(job.job_id, prepared.years.len(), location_ids.len())
            .await;

        let cooldown = self.settings.cooldown();
        for (index, unit) in units.iter().enumerate() {
            info!(
                "Job {}: processing {} ({}/{})",
                job.job_id,
                unit,
                index + 1,
                units.len()
            );
            self.process_unit(job, *unit, &query).await?;
            logs.push(format!("Processed {}", unit));
            if !cooldown.is_zero() {
                tokio::time::sleep(cooldown).await;
            }
        }
        Ok(())
    }

    async fn process_unit(
        &self,
        job: &AdmittedJob,
        unit: WorkUnit,
        query: &ArchiveQuery,
    ) -> Result<(), JobError> {
        let body = self
            .archive
            .fetch_unit(unit.year, unit.location_id, query)
            .await
            .map_err(|source| JobError::Fetch { unit, source })?;
        let csv_path = self
            .store
            .save_file(&job.directory.path, &unit.raw_file_name(), body)
            .await?;
        self.tracker.update_download_progress(job.job_id, unit).await;

        if job.prepared.convert_to_epw {
            convert_csv_to_epw_async(csv_path, job.prepared.labels.clone())
                .await
                .map_err(|source| JobError::Conversion { unit, source })?;
            self.tracker
                .update_conversion_progress(job.job_id, unit)
                .await;
        }
        Ok(())
    }

    async fn collect(&self, job: &AdmittedJob, logs: &mut Vec<String>) -> Result<JobResult, JobError> {
        let dir = &job.directory.path;
        let files = self.store.job_files(dir).await?;
        let summary = self.store.job_summary(dir).await?;
        logs.push("Job completed successfully".to_string());
        logs.push(format!("Generated {} CSV files", files.csv.len()));
        logs.push(format!("Generated {} EPW files", files.epw.len()));
        Ok(JobResult::Success(JobSuccess {
            job_id: job.job_id,
            directory: dir.clone(),
            files,
            summary,
            logs: std::mem::take(logs),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epw::converter::tests::sample_csv;
    use crate::progress::job_state::JobStatus;
    use crate::types::job_result::FailureKind;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Copy)]
    enum Discovery {
        Ids(&'static [u64]),
        Garbled,
        Unreachable,
    }

    /// In-memory archive. Serves a full hourly year for every unit unless the
    /// unit is listed in `failing`, after waiting `delay`.
    struct FakeArchive {
        discovery: Discovery,
        failing: Vec<WorkUnit>,
        rows: usize,
        delay: Duration,
        fetched: StdMutex<Vec<WorkUnit>>,
    }

    impl FakeArchive {
        fn new(discovery: Discovery) -> Self {
            Self {
                discovery,
                failing: Vec::new(),
                rows: 8760,
                delay: Duration::ZERO,
                fetched: StdMutex::new(Vec::new()),
            }
        }

        fn fetched(&self) -> Vec<WorkUnit> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl Archive for FakeArchive {
        async fn discover_locations(
            &self,
            _location_seed: &str,
            _query: &ArchiveQuery,
        ) -> Result<Vec<u64>, ArchiveError> {
            match self.discovery {
                Discovery::Ids(ids) => Ok(ids.to_vec()),
                Discovery::Garbled => Err(ArchiveError::DiscoveryFormat {
                    reason: "POINTS block not found in the script".to_string(),
                }),
                Discovery::Unreachable => Err(ArchiveError::Timeout("fake".to_string())),
            }
        }

        async fn fetch_unit(
            &self,
            year: i32,
            location_id: u64,
            _query: &ArchiveQuery,
        ) -> Result<Vec<u8>, ArchiveError> {
            let unit = WorkUnit { year, location_id };
            self.fetched.lock().unwrap().push(unit);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(&unit) {
                return Err(ArchiveError::Timeout(format!("fake/{}", unit)));
            }
            Ok(sample_csv(year, self.rows, 60).into_bytes())
        }
    }

    fn orchestrator(
        archive: FakeArchive,
        outputs: &Path,
    ) -> Orchestrator<FakeArchive, WktGeometry> {
        let settings = Settings::default()
            .with_outputs_dir(outputs)
            .with_cooldown(Duration::ZERO);
        Orchestrator::builder()
            .settings(settings)
            .archive(archive)
            .geometry(WktGeometry)
            .build()
    }

    fn request(years: &[&str]) -> JobRequest {
        JobRequest::builder()
            .wkt("POINT(-76.5 42.4)")
            .dataset("aggregated")
            .interval("60")
            .years(years.iter().map(|y| y.to_string()).collect())
            .api_key("key")
            .email("me@example.com")
            .location("Ithaca")
            .region("NY")
            .country("USA")
            .build()
    }

    #[tokio::test]
    async fn test_duplicate_years_fetch_once() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Ids(&[1127013])), temp.path());

        let result = orch.run(request(&["2021", "2021", "2022"])).await;
        let JobResult::Success(success) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(
            orch.archive.fetched(),
            vec![
                WorkUnit { year: 2021, location_id: 1127013 },
                WorkUnit { year: 2022, location_id: 1127013 },
            ]
        );

        let state = orch.progress(success.job_id).await.unwrap().state;
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.total_units, 2);
        assert_eq!(state.completed_downloads, 2);
        assert_eq!(state.completed_conversions, 2);
        assert_eq!(state.download_progress, 100.0);

        assert_eq!(success.files.csv.len(), 2);
        assert_eq!(success.files.epw.len(), 2);
        assert_eq!(success.summary.total_files, 4);
        assert!(success
            .files
            .epw
            .iter()
            .any(|p| p.ends_with("Ithaca_42.45_-76.46_2021.epw")));
        assert!(success.directory.starts_with(temp.path()));
        assert!(success.logs.iter().any(|l| l == "Generated 2 EPW files"));
        Ok(())
    }

    #[tokio::test]
    async fn test_garbled_discovery_fails_without_fetching() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Garbled), temp.path());

        let result = orch.run(request(&["2022"])).await;
        let JobResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Discovery);
        assert!(failure.errors[0].contains("invalid API key"));
        assert!(orch.archive.fetched().is_empty());

        let job_id = failure.job_id.unwrap();
        let state = orch.progress(job_id).await.unwrap().state;
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.completed_downloads, 0);
        assert!(state.error.unwrap().contains("POINTS block not found"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_discovery_is_a_fetch_failure() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Unreachable), temp.path());
        let result = orch.run(request(&["2022"])).await;
        let JobResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Fetch);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_remaining_units() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let mut archive = FakeArchive::new(Discovery::Ids(&[1, 2]));
        archive.failing.push(WorkUnit { year: 2021, location_id: 2 });
        let orch = orchestrator(archive, temp.path());

        let result = orch.run(request(&["2021", "2022"])).await;
        let JobResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Fetch);
        assert!(failure.errors[0].starts_with("Failed to fetch year 2021 at location 2"));
        // 2022 units were never attempted.
        assert_eq!(orch.archive.fetched().len(), 2);

        let state = orch.progress(failure.job_id.unwrap()).await.unwrap().state;
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.completed_downloads, 1);
        assert_eq!(state.total_units, 4);

        // Files of the finished unit stay on disk.
        let dirs: Vec<_> = std::fs::read_dir(temp.path())?.collect::<Result<_, _>>()?;
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].path().join("1_2021.csv").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_conversion_failure_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let mut archive = FakeArchive::new(Discovery::Ids(&[7]));
        archive.rows = 24;
        let orch = orchestrator(archive, temp.path());

        let result = orch.run(request(&["2022"])).await;
        let JobResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Conversion);
        let state = orch.progress(failure.job_id.unwrap()).await.unwrap().state;
        assert_eq!(state.completed_downloads, 1);
        assert_eq!(state.completed_conversions, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_without_conversion_only_csv_is_written() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Ids(&[7])), temp.path());
        let mut req = request(&["2022"]);
        req.convert_to_epw = false;

        let JobResult::Success(success) = orch.run(req).await else {
            panic!("expected success");
        };
        assert_eq!(success.files.csv.len(), 1);
        assert!(success.files.epw.is_empty());
        let state = orch.progress(success.job_id).await.unwrap().state;
        assert_eq!(state.conversion_progress, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effects() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Ids(&[1])), temp.path());
        let mut req = request(&["22"]);
        req.api_key.clear();

        let JobResult::Failure(failure) = orch.run(req).await else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.job_id.is_none());
        assert_eq!(failure.errors.len(), 2);
        assert!(orch.archive.fetched().is_empty());
        assert!(orch.tracker().is_empty().await);
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_background_start_and_join() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = Arc::new(orchestrator(
            FakeArchive::new(Discovery::Ids(&[1, 2])),
            temp.path(),
        ));

        let first = orch.start(request(&["2021"])).await?;
        let second = orch.start(request(&["2021"])).await?;
        assert_ne!(first.job_id(), second.job_id());
        // Same labels in the same second still get separate directories.
        assert_ne!(first.directory(), second.directory());
        assert!(orch.progress(first.job_id()).await.is_some());

        let second_id = second.detach();
        let result = first.join().await?;
        assert!(result.is_success());

        // The detached job finishes on its own.
        for _ in 0..500 {
            let state = orch.progress(second_id).await.unwrap().state;
            if state.status.is_terminal() {
                assert_eq!(state.status, JobStatus::Completed);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("detached job never finished");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_request() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = Arc::new(orchestrator(FakeArchive::new(Discovery::Ids(&[1])), temp.path()));
        let err = orch.start(request(&[])).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_removes_finished_jobs() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let orch = orchestrator(FakeArchive::new(Discovery::Ids(&[1])), temp.path());
        let result = orch.run(request(&["2022"])).await;
        assert!(result.is_success());

        // Default retention is a day, so nothing is old enough yet.
        assert_eq!(orch.cleanup_expired().await?, CleanupReport::default());

        let report = orch.cleanup(Duration::ZERO).await?;
        assert_eq!(report.jobs_evicted, 1);
        assert_eq!(report.directories_removed, 1);
        assert!(orch.tracker().is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_keeps_directory_of_running_job() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let mut archive = FakeArchive::new(Discovery::Ids(&[1]));
        archive.delay = Duration::from_millis(300);
        let orch = Arc::new(orchestrator(archive, temp.path()));

        let handle = orch.start(request(&["2022"])).await?;
        let directory = handle.directory().to_path_buf();
        while orch.archive.fetched().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The fetch is still in flight.
        let report = orch.cleanup(Duration::ZERO).await?;
        assert_eq!(report, CleanupReport::default());
        assert!(directory.is_dir());

        let result = handle.join().await?;
        assert!(result.is_success(), "expected success, got {result:?}");

        let report = orch.cleanup(Duration::ZERO).await?;
        assert_eq!(report.directories_removed, 1);
        assert!(!directory.exists());
        Ok(())
    }
}
