use crate::archive::discovery::location_ids_from_response;
use crate::archive::error::ArchiveError;
use crate::types::dataset::{Dataset, REQUESTED_ATTRIBUTES};
use futures_util::TryStreamExt;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Parameters shared by every archive call of one job.
#[derive(Debug, Clone)]
pub struct ArchiveQuery {
    pub dataset: Dataset,
    /// Sampling interval in minutes.
    pub interval: u32,
    pub api_key: String,
    pub email: String,
}

/// The external time-series archive.
///
/// Both calls return `Send` futures so that jobs can run on spawned tasks.
pub trait Archive: Send + Sync {
    /// Resolves a query geometry into the archive's location ids, in archive order.
    fn discover_locations(
        &self,
        location_seed: &str,
        query: &ArchiveQuery,
    ) -> impl Future<Output = Result<Vec<u64>, ArchiveError>> + Send;

    /// Downloads the raw CSV for one year at one location.
    fn fetch_unit(
        &self,
        year: i32,
        location_id: u64,
        query: &ArchiveQuery,
    ) -> impl Future<Output = Result<Vec<u8>, ArchiveError>> + Send;
}

/// [`Archive`] implementation talking to the NREL NSRDB API.
pub struct NsrdbArchive {
    client: Client,
    api_base_url: String,
    discovery_url: String,
}

impl NsrdbArchive {
    /// Every request made by this archive is bounded by `timeout`.
    pub fn new(
        api_base_url: impl Into<String>,
        discovery_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ArchiveError::ClientBuild)?;
        Ok(Self {
            client,
            api_base_url: api_base_url.into(),
            discovery_url: discovery_url.into(),
        })
    }

    fn download_url(&self, dataset: Dataset) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        format!("{}/solar/{}-download.csv", base, dataset.archive_name())
    }

    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<reqwest::Response, ArchiveError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ArchiveError::from_reqwest(url, e))?;

        match response.error_for_status() {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e.status());
                Err(ArchiveError::from_reqwest(url, e))
            }
        }
    }
}

impl Archive for NsrdbArchive {
    async fn discover_locations(
        &self,
        location_seed: &str,
        query: &ArchiveQuery,
    ) -> Result<Vec<u64>, ArchiveError> {
        let params = [
            ("email", query.email.clone()),
            ("wkt", location_seed.to_string()),
            ("attributes", REQUESTED_ATTRIBUTES.to_string()),
            ("names", "2023".to_string()),
            ("interval", "60".to_string()),
            ("to_utc", "false".to_string()),
            ("api_key", query.api_key.clone()),
            ("dataset", query.dataset.archive_name().to_string()),
        ];
        info!("Resolving locations for {} in {}", location_seed, query.dataset);

        let url = self.discovery_url.as_str();
        let response = self.get(url, &params).await?;
        // An unparseable body is the archive misbehaving, not the network.
        let body: Value = response
            .json()
            .await
            .map_err(|e| ArchiveError::DiscoveryFormat {
                reason: format!("response is not JSON: {e}"),
            })?;

        let ids = location_ids_from_response(&body)?;
        info!("Discovery returned {} location(s)", ids.len());
        Ok(ids)
    }

    async fn fetch_unit(
        &self,
        year: i32,
        location_id: u64,
        query: &ArchiveQuery,
    ) -> Result<Vec<u8>, ArchiveError> {
        let url = self.download_url(query.dataset);
        let params = [
            ("attributes", REQUESTED_ATTRIBUTES.to_string()),
            ("interval", query.interval.to_string()),
            ("to_utc", "false".to_string()),
            ("api_key", query.api_key.clone()),
            ("email", query.email.clone()),
            ("names", year.to_string()),
            ("location_ids", location_id.to_string()),
        ];
        info!("Downloading {} for location {} year {}", query.dataset, location_id, year);

        let response = self.get(&url, &params).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(stream);
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.map_err(|e| {
            // reqwest surfaces a body timeout as an I/O error inside the stream.
            if e.get_ref()
                .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
                .is_some_and(reqwest::Error::is_timeout)
            {
                ArchiveError::Timeout(url.clone())
            } else {
                ArchiveError::DownloadIo(e)
            }
        })?;

        info!(
            "Downloaded {} bytes for location {} year {}",
            body.len(),
            location_id,
            year
        );
        Ok(body)
    }
}
