//! Runtime settings, read from `OPENWEATHER_*` environment variables (and an
//! optional `.env` file) or built in code.

use crate::utils::default_outputs_dir;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "OPENWEATHER_";

fn default_api_base_url() -> String {
    "https://developer.nrel.gov/api/nsrdb/v2/".to_string()
}

fn default_discovery_url() -> String {
    "https://maps-api.nrel.gov/bigdata/v2/sample-code".to_string()
}

fn default_cooldown_ms() -> u64 {
    1_000
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_job_retention_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root directory under which job directories are created.
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Base URL of the NSRDB download API, ending in a slash.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Endpoint that resolves a WKT geometry into archive location ids.
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    /// Pause after every unit of work, to stay under the archive rate limit.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Upper bound on a single archive request.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Age after which finished jobs are evicted by the maintenance sweep.
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            outputs_dir: default_outputs_dir(),
            api_base_url: default_api_base_url(),
            discovery_url: default_discovery_url(),
            cooldown_ms: default_cooldown_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            job_retention_hours: default_job_retention_hours(),
        }
    }
}

impl Settings {
    /// Reads `OPENWEATHER_OUTPUTS_DIR`, `OPENWEATHER_API_BASE_URL`,
    /// `OPENWEATHER_DISCOVERY_URL`, `OPENWEATHER_COOLDOWN_MS`,
    /// `OPENWEATHER_FETCH_TIMEOUT_SECS` and `OPENWEATHER_JOB_RETENTION_HOURS`.
    /// Unset variables fall back to their defaults.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed(ENV_PREFIX).from_env()
    }

    pub fn with_outputs_dir(mut self, outputs_dir: impl Into<PathBuf>) -> Self {
        self.outputs_dir = outputs_dir.into();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_secs = timeout.as_secs();
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_hours * 3600)
    }
}
