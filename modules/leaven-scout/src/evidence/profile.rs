use async_trait::async_trait;

use leaven_common::{Candidate, EvidenceSource};

use super::{EvidenceFetcher, FetchError, FetchOutcome};

/// The description that came back with the search result. No network.
pub struct BusinessProfileFetcher;

#[async_trait]
impl EvidenceFetcher for BusinessProfileFetcher {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::BusinessProfile
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<FetchOutcome, FetchError> {
        Ok(match candidate.raw_description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => FetchOutcome::Text(text.to_string()),
            _ => FetchOutcome::Unavailable("no business description".into()),
        })
    }
}
