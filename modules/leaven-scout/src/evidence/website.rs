use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use leaven_common::{Candidate, EvidenceSource};

use super::{html, EvidenceFetcher, FetchError, FetchOutcome, PageFetcher};

/// One GET of the candidate's own website.
pub struct WebsiteFetcher {
    pages: Arc<dyn PageFetcher>,
}

impl WebsiteFetcher {
    pub fn new(pages: Arc<dyn PageFetcher>) -> Self {
        Self { pages }
    }
}

/// Accept bare domains ("pizza-a.com") by assuming https.
pub fn normalize_website(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            message: "missing host".into(),
        });
    }
    Ok(url)
}

#[async_trait]
impl EvidenceFetcher for WebsiteFetcher {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Website
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<FetchOutcome, FetchError> {
        let Some(raw) = candidate.website.as_deref().filter(|w| !w.trim().is_empty()) else {
            return Ok(FetchOutcome::Unavailable("no website".into()));
        };
        let url = normalize_website(raw)?;

        let body = self.pages.get(url.as_str()).await?;
        let text = html::visible_text(&body);
        debug!(url = url.as_str(), chars = text.len(), "Website text extracted");
        Ok(FetchOutcome::Text(text))
    }
}
