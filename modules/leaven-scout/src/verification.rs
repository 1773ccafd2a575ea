//! Per-candidate verification: run every evidence fetcher, scan the text,
//! combine the results into a decision.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use leaven_common::{Candidate, EvidenceResult, EvidenceSource, PipelineConfig, VerificationDecision};

use crate::evidence::{
    BusinessProfileFetcher, EvidenceFetcher, FetchError, FetchOutcome, PageFetcher,
    SocialBioFetcher, WebsiteFetcher,
};
use crate::keywords::KeywordMatcher;

#[derive(Debug, Clone)]
pub struct Verification {
    pub decision: VerificationDecision,
    /// One result per fetcher, in fetcher order.
    pub evidence: Vec<EvidenceResult>,
    /// Fetches that failed outright (as opposed to having nothing to fetch).
    pub failures: Vec<(EvidenceSource, FetchError)>,
}

pub struct VerificationEngine {
    matcher: KeywordMatcher,
    fetchers: Vec<Arc<dyn EvidenceFetcher>>,
}

impl VerificationEngine {
    pub fn new(matcher: KeywordMatcher, fetchers: Vec<Arc<dyn EvidenceFetcher>>) -> Self {
        Self { matcher, fetchers }
    }

    /// Business profile, website and social bio over a shared page fetcher.
    pub fn standard(config: &PipelineConfig, pages: Arc<dyn PageFetcher>) -> Self {
        let fetchers: Vec<Arc<dyn EvidenceFetcher>> = vec![
            Arc::new(BusinessProfileFetcher),
            Arc::new(WebsiteFetcher::new(pages.clone())),
            Arc::new(SocialBioFetcher::new(pages).enabled(config.social_lookup)),
        ];
        Self::new(KeywordMatcher::new(&config.keywords), fetchers)
    }

    /// Never fails: a fetcher error becomes a not-fetched result.
    pub async fn verify(&self, candidate: &Candidate) -> Verification {
        let outcomes = join_all(self.fetchers.iter().map(|fetcher| async move {
            (fetcher.source(), fetcher.fetch(candidate).await)
        }))
        .await;

        let mut evidence = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (source, outcome) in outcomes {
            let result = match outcome {
                Ok(FetchOutcome::Text(text)) => self.matcher.evidence(source, &text),
                Ok(FetchOutcome::Unavailable(reason)) => EvidenceResult::not_fetched(source, reason),
                Err(e) => {
                    debug!(name = candidate.name.as_str(), %source, error = %e, "Evidence fetch failed");
                    let result = EvidenceResult::not_fetched(source, e.to_string());
                    failures.push((source, e));
                    result
                }
            };
            evidence.push(result);
        }

        let decision = VerificationDecision::from_evidence(&evidence);
        info!(
            name = candidate.name.as_str(),
            verified = decision.verified,
            keywords = ?decision.keywords,
            sources = ?decision.sources,
            "Candidate checked"
        );
        Verification {
            decision,
            evidence,
            failures,
        }
    }
}
