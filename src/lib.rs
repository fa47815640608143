mod archive;
mod config;
mod epw;
mod error;
mod geometry;
mod jobs;
mod progress;
mod storage;
mod types;
mod utils;

pub use config::Settings;
pub use error::OpenWeatherError;
pub use utils::{default_outputs_dir, error_chain};

pub use archive::client::{Archive, ArchiveQuery, NsrdbArchive};
pub use archive::discovery::{location_ids_from_response, location_ids_from_script};
pub use archive::error::ArchiveError;

pub use epw::converter::{convert_csv_to_epw, convert_csv_to_epw_async, ConversionOutput};
pub use epw::error::{ConversionError, ConversionErrorClass};
pub use epw::raw_record::{RawRecord, SiteMetadata};
pub use epw::weather_record::{
    relative_humidity, WeatherRecord, EPW_FIELDS, HOURS_PER_YEAR, SENTINEL,
    SUPPORTED_INTERVAL_MINUTES,
};

pub use geometry::{buffered_point_wkt, point_wkt, GeometryValidator, WktGeometry};

pub use jobs::error::JobError;
pub use jobs::orchestrator::{CleanupReport, JobHandle, Orchestrator};
pub use jobs::validation::{validate_request, PreparedJob};

pub use progress::job_state::{JobState, JobStatus, ProgressSnapshot};
pub use progress::tracker::ProgressTracker;

pub use storage::error::StorageError;
pub use storage::output_store::{format_file_size, sanitize_label, JobDirectory, OutputStore};

pub use types::dataset::{Dataset, DatasetInfo, UnknownDataset, REQUESTED_ATTRIBUTES};
pub use types::job_id::JobId;
pub use types::job_request::{dedup_years, work_units, JobRequest, LocationLabels, WorkUnit};
pub use types::job_result::{
    FailureKind, FileSummary, JobFailure, JobFiles, JobResult, JobSuccess, JobSummary,
};
