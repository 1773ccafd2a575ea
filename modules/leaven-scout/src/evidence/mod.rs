// Evidence fetchers.
//
// Each fetcher turns a candidate into raw text from one independent source.
// EvidenceFetcher is the seam the verification engine runs over; PageFetcher
// is the single HTTP GET the website and social fetchers share, so both can
// be exercised without a network.

pub mod html;
pub mod profile;
pub mod social;
pub mod website;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use leaven_common::{Candidate, EvidenceSource};

pub use profile::BusinessProfileFetcher;
pub use social::{SocialBioFetcher, SocialPlatform};
pub use website::WebsiteFetcher;

/// Desktop browser UA. Several site builders serve an empty shell to obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Text to scan for keywords.
    Text(String),
    /// Nothing to fetch for this candidate (no description, no website, no
    /// social profile). Not an error.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

#[async_trait]
pub trait EvidenceFetcher: Send + Sync {
    fn source(&self) -> EvidenceSource;

    async fn fetch(&self, candidate: &Candidate) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url` and return the body. Non-2xx is an error.
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Redirects are followed (reqwest default policy); the whole request is
    /// bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("Failed to build page HTTP client");
        Self { client }
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "Page fetch rejected");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| request_error(url, e))
    }
}
