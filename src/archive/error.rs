use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Data download failed")]
    DownloadIo(#[from] std::io::Error),

    // The archive answered, but not with the structure we expect.
    #[error("Unexpected discovery response: {reason}")]
    DiscoveryFormat { reason: String },
}

impl ArchiveError {
    /// Whether the archive responded with a payload lacking the expected
    /// structure, as opposed to a transport failure.
    pub fn is_discovery_format(&self) -> bool {
        matches!(self, ArchiveError::DiscoveryFormat { .. })
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ArchiveError::Timeout(url.to_string())
        } else if let Some(status) = e.status() {
            ArchiveError::HttpStatus {
                url: url.to_string(),
                status,
                source: e,
            }
        } else {
            ArchiveError::NetworkRequest(url.to_string(), e)
        }
    }
}
