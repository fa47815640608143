use crate::storage::error::StorageError;
use crate::types::job_request::LocationLabels;
use crate::types::job_result::{FileSummary, JobFiles, JobSummary};
use crate::utils::ensure_dir_exists;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::task;

/// Suffixes tried after the bare name is taken: `_2` through `_{MAX}`.
const MAX_NAME_ATTEMPTS: u32 = 100;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// A freshly claimed job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDirectory {
    pub path: PathBuf,
    /// Directory name, `Location_Region_Country_YYYYmmdd_HHMMSS[_n]`.
    pub name: String,
}

/// Reduces a free-text label to characters every filesystem accepts.
///
/// Non-ASCII characters are dropped, ASCII punctuation becomes a space, runs of
/// whitespace collapse to one space. An empty result becomes `"Unknown"`.
pub fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(char::is_ascii)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "Unknown".to_string()
    } else {
        collapsed
    }
}

/// Human-readable size with one decimal, e.g. `"1.5 KB"`. Zero is `"0 B"`.
pub fn format_file_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

/// Owns the output root and everything written under it.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claims a new directory for a job, named after its labels and the
    /// current local time.
    pub async fn create_job_directory(
        &self,
        labels: &LocationLabels,
    ) -> Result<JobDirectory, StorageError> {
        self.create_job_directory_at(labels, Local::now().naive_local())
            .await
    }

    /// Directory creation is atomic, so two jobs racing for the same name in
    /// the same second end up with `name` and `name_2`.
    pub(crate) async fn create_job_directory_at(
        &self,
        labels: &LocationLabels,
        timestamp: NaiveDateTime,
    ) -> Result<JobDirectory, StorageError> {
        ensure_dir_exists(&self.root)
            .await
            .map_err(|e| StorageError::CreateRoot(self.root.clone(), e))?;

        let base = format!(
            "{}_{}_{}_{}",
            sanitize_label(&labels.location),
            sanitize_label(&labels.region),
            sanitize_label(&labels.country),
            timestamp.format("%Y%m%d_%H%M%S")
        );

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            let path = self.root.join(&name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    info!("Created job directory {}", path.display());
                    return Ok(JobDirectory { path, name });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("Job directory {} already exists, trying next suffix", name);
                }
                Err(e) => return Err(StorageError::CreateDir(path, e)),
            }
        }

        Err(StorageError::NameExhausted {
            base,
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    /// Writes `contents` to `dir/file_name` via a temporary file in the same
    /// directory, so the target is either absent or complete.
    pub async fn save_file(
        &self,
        dir: &Path,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<PathBuf, StorageError> {
        if file_name.is_empty()
            || file_name == "."
            || file_name == ".."
            || file_name.contains(['/', '\\'])
        {
            return Err(StorageError::InvalidFileName(file_name.to_string()));
        }

        let dir = dir.to_path_buf();
        let target = dir.join(file_name);
        task::spawn_blocking(move || {
            let mut tmp =
                NamedTempFile::new_in(&dir).map_err(|e| StorageError::Write(target.clone(), e))?;
            tmp.write_all(&contents)
                .and_then(|_| tmp.flush())
                .map_err(|e| StorageError::Write(target.clone(), e))?;
            tmp.persist(&target)
                .map_err(|e| StorageError::Write(target.clone(), e.error))?;
            Ok(target)
        })
        .await?
    }

    /// Regular files directly inside `dir`, sorted by path. A missing
    /// directory has no files.
    pub async fn list_job_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::List(dir.to_path_buf(), e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::List(dir.to_path_buf(), e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::Metadata(entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn job_files(&self, dir: &Path) -> Result<JobFiles, StorageError> {
        let all = self.list_job_files(dir).await?;
        let with_ext = |ext: &str| -> Vec<PathBuf> {
            all.iter()
                .filter(|p| file_type(p) == ext)
                .cloned()
                .collect()
        };
        Ok(JobFiles {
            csv: with_ext(".csv"),
            epw: with_ext(".epw"),
            all: all.clone(),
        })
    }

    pub async fn job_summary(&self, dir: &Path) -> Result<JobSummary, StorageError> {
        let dir_meta = tokio::fs::metadata(dir)
            .await
            .map_err(|e| StorageError::Metadata(dir.to_path_buf(), e))?;
        let created = dir_meta
            .created()
            .or_else(|_| dir_meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        let mut files = Vec::new();
        for path in self.list_job_files(dir).await? {
            let size = tokio::fs::metadata(&path)
                .await
                .map_err(|e| StorageError::Metadata(path.clone(), e))?
                .len();
            files.push(FileSummary {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size,
                size_formatted: format_file_size(size),
                file_type: file_type(&path),
            });
        }

        let total_size = files.iter().map(|f| f.size).sum();
        let count = |ext: &str| files.iter().filter(|f| f.file_type == ext).count();
        Ok(JobSummary {
            job_dir: dir.to_path_buf(),
            job_name: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            total_files: files.len(),
            csv_files: count(".csv"),
            epw_files: count(".epw"),
            total_size,
            total_size_formatted: format_file_size(total_size),
            created,
            files,
        })
    }

    /// Removes job directories whose last modification is at least `max_age`
    /// ago, except those listed in `keep`. Directories that cannot be
    /// inspected or removed are skipped. Returns how many were removed.
    pub async fn cleanup_old_jobs(
        &self,
        max_age: Duration,
        keep: &HashSet<PathBuf>,
    ) -> Result<usize, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::List(self.root.clone(), e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::List(self.root.clone(), e))?
        {
            let path = entry.path();
            if keep.contains(&path) {
                debug!("Keeping {} during cleanup, job still running", path.display());
                continue;
            }
            let expired = match entry.metadata().await {
                Ok(meta) if meta.is_dir() => meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .is_some_and(|age| age >= max_age),
                Ok(_) => false,
                Err(e) => {
                    warn!("Skipping {} during cleanup: {}", path.display(), e);
                    false
                }
            };
            if !expired {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!("Removed old job directory {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Lowercased extension with its dot, or empty.
fn file_type(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
