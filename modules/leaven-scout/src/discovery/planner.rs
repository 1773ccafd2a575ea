//! Query planning: render templates for a locale, submit each through the
//! poller, filter for relevance, and merge into one candidate set.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use leaven_common::{Candidate, PipelineConfig, QueryTemplate};
use places_client::{PlaceRecord, SearchRequest};

use crate::discovery::{CandidateSet, MergeStats, RelevancePolicy};
use crate::error::{ErrorScope, RunError, ScoutError};
use crate::places::PlacesBackend;
use crate::poller::BackoffPoller;
use crate::spacing::RequestSpacer;

/// What happened to one rendered query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub query: String,
    pub limit: u32,
    pub result_count: u32,
    pub relevant_count: u32,
    pub merge: MergeStats,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub candidates: CandidateSet,
    pub queries_submitted: u32,
    pub queries_failed: u32,
    pub reports: Vec<QueryReport>,
    pub errors: Vec<RunError>,
    pub cancelled: bool,
}

enum QueryResult {
    Places(Vec<PlaceRecord>),
    Failed(ScoutError),
    Skipped,
}

pub struct QueryPlanner {
    poller: BackoffPoller<PlacesBackend>,
    spacer: Arc<RequestSpacer>,
    relevance: RelevancePolicy,
    templates: Vec<QueryTemplate>,
    product: String,
    category: String,
    language: String,
    region: String,
    concurrency: usize,
}

impl QueryPlanner {
    pub fn new(
        poller: BackoffPoller<PlacesBackend>,
        spacer: Arc<RequestSpacer>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            poller,
            spacer,
            relevance: RelevancePolicy::new(&config.relevance),
            templates: config.query_templates.clone(),
            product: config.product.clone(),
            category: config.category.clone(),
            language: config.language.clone(),
            region: config.region.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Rendered requests, in template order.
    pub fn requests(&self, city: &str, state: &str) -> Vec<SearchRequest> {
        self.templates
            .iter()
            .map(|t| {
                SearchRequest::new(t.render(&self.product, &self.category, city, state), t.limit)
                    .with_locale(&self.language, &self.region)
            })
            .collect()
    }

    /// Run every template for the locale. Transient failures are recorded
    /// and skipped; auth and quota failures abort.
    pub async fn build_candidate_set(
        &self,
        city: &str,
        state: &str,
        cancel: &CancellationToken,
    ) -> Result<PlanOutcome, ScoutError> {
        let requests = self.requests(city, state);
        info!(city, state, queries = requests.len(), "Planning discovery queries");

        let mut outcome = PlanOutcome::default();
        let mut results = stream::iter(requests)
            .map(|request| async move {
                let result = self.run_query(&request, cancel).await;
                (request, result)
            })
            .buffered(self.concurrency);

        while let Some((request, result)) = results.next().await {
            let places = match result {
                QueryResult::Skipped => {
                    outcome.cancelled = true;
                    continue;
                }
                QueryResult::Failed(e) if e.is_fatal() => return Err(e),
                QueryResult::Failed(e) => {
                    warn!(query = request.query.as_str(), error = %e, "Query failed");
                    outcome.queries_submitted += 1;
                    outcome.queries_failed += 1;
                    outcome.reports.push(QueryReport {
                        query: request.query.clone(),
                        limit: request.limit,
                        result_count: 0,
                        relevant_count: 0,
                        merge: MergeStats::default(),
                        error: Some(e.to_string()),
                    });
                    outcome.errors.push(RunError::new(
                        &e,
                        ErrorScope::Query {
                            query: request.query,
                        },
                    ));
                    continue;
                }
                QueryResult::Places(places) => places,
            };

            outcome.queries_submitted += 1;
            let result_count = places.len() as u32;
            let relevant: Vec<Candidate> = places
                .into_iter()
                .filter_map(|p| candidate_from_place(p, city, state))
                .filter(|c| {
                    let categories: Vec<String> = c.categories.iter().cloned().collect();
                    self.relevance
                        .is_relevant(&c.name, c.raw_description.as_deref(), &categories)
                })
                .collect();
            let relevant_count = relevant.len() as u32;
            let merge = outcome.candidates.merge(relevant);

            info!(
                query = request.query.as_str(),
                result_count,
                relevant_count,
                added = merge.added,
                total = outcome.candidates.len(),
                "Query merged"
            );
            outcome.reports.push(QueryReport {
                query: request.query,
                limit: request.limit,
                result_count,
                relevant_count,
                merge,
                error: None,
            });
        }

        info!(
            city,
            state,
            candidates = outcome.candidates.len(),
            failed = outcome.queries_failed,
            cancelled = outcome.cancelled,
            "Discovery complete"
        );
        Ok(outcome)
    }

    async fn run_query(&self, request: &SearchRequest, cancel: &CancellationToken) -> QueryResult {
        if cancel.is_cancelled() {
            return QueryResult::Skipped;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return QueryResult::Skipped,
            _ = self.spacer.wait() => {}
        }

        info!(query = request.query.as_str(), limit = request.limit, "Submitting query");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => QueryResult::Skipped,
            result = self.poller.submit_and_await(request) => match result {
                Ok(places) => QueryResult::Places(places),
                Err(e) => QueryResult::Failed(e.into()),
            },
        }
    }
}

/// Convert a raw place into a candidate. Places without a name are dropped;
/// missing city/state default to the run's locale.
pub fn candidate_from_place(place: PlaceRecord, city: &str, state: &str) -> Option<Candidate> {
    let name = place.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
    let or_default = |value: Option<&String>, default: &str| {
        value
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let mut candidate = Candidate::new(
        name,
        place.address().unwrap_or_default(),
        or_default(place.city.as_ref(), city),
        or_default(place.state.as_ref(), state),
    );
    candidate.zip_code = place.postal_code.clone().filter(|z| !z.trim().is_empty());
    candidate.phone = place.phone.clone().filter(|p| !p.trim().is_empty());
    candidate.website = place.website().map(str::to_string);
    candidate.rating = place.rating.filter(|r| r.is_finite());
    candidate.review_count = place.review_count();
    candidate.latitude = place.latitude;
    candidate.longitude = place.longitude;
    candidate.raw_description = place.description.clone().filter(|d| !d.trim().is_empty());
    candidate.categories = place.all_categories().into_iter().collect();
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use leaven_common::SpacingConfig;

    use super::*;
    use crate::poller::{JobError, PollPolicy};
    use crate::testing::{place, MockJobBackend};

    fn config(templates: Vec<QueryTemplate>) -> PipelineConfig {
        PipelineConfig {
            query_templates: templates,
            ..PipelineConfig::default()
        }
    }

    fn planner(backend: MockJobBackend, config: &PipelineConfig) -> QueryPlanner {
        let backend: Arc<PlacesBackend> = Arc::new(backend);
        QueryPlanner::new(
            BackoffPoller::new(backend, PollPolicy::immediate(3)),
            Arc::new(RequestSpacer::disabled()),
            config,
        )
    }

    fn pizzeria(name: &str, lat: f64, lng: f64) -> PlaceRecord {
        PlaceRecord {
            category: Some("Pizza restaurant".into()),
            ..place(name, lat, lng)
        }
    }

    #[test]
    fn renders_templates_with_locale() {
        let cfg = config(vec![
            QueryTemplate::new("{product} {category} {city} {state}", 40),
            QueryTemplate::new("{category}  restaurants {city}", 60),
        ]);
        let requests = planner(MockJobBackend::new(), &cfg).requests("Portland", "OR");
        assert_eq!(requests[0].query, "sourdough pizza Portland OR");
        assert_eq!(requests[0].limit, 40);
        assert_eq!(requests[1].query, "pizza restaurants Portland");
        assert_eq!(requests[1].language, "en");
    }

    #[tokio::test]
    async fn merges_results_across_templates() {
        let cfg = config(vec![
            QueryTemplate::new("first {city}", 10),
            QueryTemplate::new("second {city}", 10),
        ]);
        let backend = MockJobBackend::new()
            .on_query("first Portland", vec![pizzeria("Pizza A", 10.0001, 20.0001)])
            .pending_then(
                "second Portland",
                1,
                vec![
                    pizzeria("Pizza A", 10.0, 20.0),
                    pizzeria("Pizza B", 11.0, 21.0),
                ],
            );

        let outcome = planner(backend, &cfg)
            .build_candidate_set("Portland", "OR", &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = outcome.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Pizza A", "Pizza B"]);
        assert_eq!(outcome.queries_submitted, 2);
        assert_eq!(outcome.queries_failed, 0);
        assert_eq!(outcome.reports[1].merge, MergeStats { added: 1, merged: 1 });
    }

    #[tokio::test]
    async fn irrelevant_and_nameless_places_are_dropped() {
        let cfg = config(vec![QueryTemplate::new("q", 10)]);
        let backend = MockJobBackend::new().on_query(
            "q",
            vec![
                pizzeria("Pizza Hut", 1.0, 1.0),
                PlaceRecord::default(),
                place("Corner Laundromat", 2.0, 2.0),
                pizzeria("Good Pie", 3.0, 3.0),
            ],
        );

        let outcome = planner(backend, &cfg)
            .build_candidate_set("Portland", "OR", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.reports[0].result_count, 4);
        assert_eq!(outcome.reports[0].relevant_count, 1);
    }

    #[tokio::test]
    async fn transient_failure_is_recorded_and_run_continues() {
        let cfg = config(vec![
            QueryTemplate::new("broken", 10),
            QueryTemplate::new("stuck", 10),
            QueryTemplate::new("fine", 10),
        ]);
        let backend = MockJobBackend::new()
            .submit_fails("broken", JobError::Transient("503".into()))
            .pending_forever("stuck")
            .on_query("fine", vec![pizzeria("Pizza C", 5.0, 5.0)]);

        let outcome = planner(backend, &cfg)
            .build_candidate_set("Portland", "OR", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.queries_submitted, 3);
        assert_eq!(outcome.queries_failed, 2);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.errors[1].kind, crate::error::ErrorKind::PollTimeout);
    }

    #[tokio::test]
    async fn spacing_holds_after_a_fast_failure() {
        let cfg = config(vec![
            QueryTemplate::new("broken", 10),
            QueryTemplate::new("fine", 10),
        ]);
        let backend: Arc<PlacesBackend> = Arc::new(
            MockJobBackend::new()
                .submit_fails("broken", JobError::Transient("503".into()))
                .on_query("fine", vec![pizzeria("Pizza C", 5.0, 5.0)]),
        );
        let planner = QueryPlanner::new(
            BackoffPoller::new(backend, PollPolicy::immediate(3)),
            Arc::new(RequestSpacer::new(SpacingConfig {
                min_ms: 150,
                max_ms: 150,
            })),
            &cfg,
        );

        let start = std::time::Instant::now();
        let outcome = planner
            .build_candidate_set("Portland", "OR", &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= std::time::Duration::from_millis(150));
        assert_eq!(outcome.queries_submitted, 2);
        assert_eq!(outcome.queries_failed, 1);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn quota_failure_aborts_planning() {
        let cfg = config(vec![
            QueryTemplate::new("fine", 10),
            QueryTemplate::new("broke", 10),
        ]);
        let backend = MockJobBackend::new()
            .on_query("fine", vec![pizzeria("Pizza C", 5.0, 5.0)])
            .submit_fails("broke", JobError::Quota("402".into()));

        let err = planner(backend, &cfg)
            .build_candidate_set("Portland", "OR", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::UpstreamQuota { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_skips_submissions() {
        let cfg = config(vec![QueryTemplate::new("q", 10)]);
        let backend = MockJobBackend::new().on_query("q", vec![pizzeria("Pizza A", 1.0, 1.0)]);
        let submits = backend.submit_counter();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = planner(backend, &cfg)
            .build_candidate_set("Portland", "OR", &cancel)
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.queries_submitted, 0);
        assert_eq!(submits.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn missing_locale_defaults_to_run_locale() {
        let mut p = pizzeria("Pizza A", 1.0, 2.0);
        p.full_address = Some("1 Main St, Portland, OR".into());
        p.city = Some("  ".into());
        p.site = Some("https://pizza-a.example".into());
        p.reviews = Some(120.0);

        let c = candidate_from_place(p, "Portland", "OR").unwrap();
        assert_eq!(c.city, "Portland");
        assert_eq!(c.state, "OR");
        assert_eq!(c.address, "1 Main St, Portland, OR");
        assert_eq!(c.website.as_deref(), Some("https://pizza-a.example"));
        assert_eq!(c.review_count, Some(120));
        assert!(c.categories.contains("Pizza restaurant"));
    }
}
