pub mod error;
pub mod types;

pub use error::{PlacesError, Result};
pub use types::{flatten_places, JobResponse, JobState, OneOrMany, PlaceRecord, SearchRequest};

use std::time::Duration;

const BASE_URL: &str = "https://api.app.outscraper.com";

/// Endpoint for place searches. `async=true` makes the API answer with a
/// request id instead of holding the connection open.
const SEARCH_PATH: &str = "/maps/search-v3";

/// Endpoint for request status and results.
const REQUESTS_PATH: &str = "/requests";

pub struct PlacesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PlacesClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build places HTTP client");
        Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (self-hosted proxy, test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Submit a search. Returns immediately with either a pending ticket or,
    /// for cached queries, the finished results.
    pub async fn submit(&self, request: &SearchRequest) -> Result<JobResponse> {
        tracing::debug!(query = %request.query, limit = request.limit, "Submitting places search");

        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let limit = request.limit.to_string();
        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[
                ("query", request.query.as_str()),
                ("limit", limit.as_str()),
                ("language", request.language.as_str()),
                ("region", request.region.as_str()),
                ("async", "true"),
            ])
            .send()
            .await?;

        Self::read_job(resp).await
    }

    /// Fetch the current state of a previously submitted request.
    pub async fn poll(&self, request_id: &str) -> Result<JobResponse> {
        let url = format!("{}{}/{}", self.base_url, REQUESTS_PATH, request_id);
        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await?;

        let job = Self::read_job(resp).await?;
        tracing::debug!(request_id, state = ?job.state(), "Polled places request");
        Ok(job)
    }

    async fn read_job(resp: reqwest::Response) -> Result<JobResponse> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlacesError::from_status(status.as_u16(), body));
        }

        let body = resp.text().await?;
        let job: JobResponse = serde_json::from_str(&body)?;
        Ok(job)
    }
}
