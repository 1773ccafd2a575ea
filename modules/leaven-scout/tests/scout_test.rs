// End-to-end orchestrator runs over mocks: no network, no database.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use leaven_common::{Candidate, EvidenceSource, PipelineConfig, QueryTemplate};
use leaven_scout::evidence::{EvidenceFetcher, FetchError, FetchOutcome};
use leaven_scout::poller::JobError;
use leaven_scout::testing::{fast_config, pizzeria, MockJobBackend, MockPageFetcher, StaticFetcher};
use leaven_scout::{ErrorKind, RunPhase, Scout, ScoutDeps, ScoutError};
use leaven_store::{InMemoryStore, RecordFilter, RecordStore};

fn two_templates() -> PipelineConfig {
    PipelineConfig {
        query_templates: vec![
            QueryTemplate::new("{product} {category} {city} {state}", 20),
            QueryTemplate::new("{category} restaurants {city} {state}", 20),
        ],
        social_lookup: false,
        ..fast_config()
    }
}

fn backend() -> MockJobBackend {
    MockJobBackend::new()
        .on_query(
            "sourdough pizza Portland OR",
            vec![
                pizzeria("Pizza A", 10.0001, 20.0001, Some("our sourdough crust")),
                pizzeria("Pizza B", 11.0, 21.0, None),
            ],
        )
        .pending_then(
            "pizza restaurants Portland OR",
            2,
            vec![
                pizzeria("Pizza A", 10.0, 20.0, None),
                pizzeria("Pizza C", 12.0, 22.0, Some("wild yeast since 1999")),
            ],
        )
}

fn scout(
    backend: MockJobBackend,
    pages: MockPageFetcher,
    store: Arc<InMemoryStore>,
    config: PipelineConfig,
) -> Scout {
    Scout::new(
        ScoutDeps::builder()
            .places(Arc::new(backend))
            .pages(Arc::new(pages))
            .store(store)
            .config(config)
            .build(),
    )
}

#[tokio::test]
async fn run_discovers_verifies_and_persists_verified_only() {
    let store = Arc::new(InMemoryStore::new());
    let scout = scout(backend(), MockPageFetcher::new(), store.clone(), two_templates());

    let summary = scout
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates_found, 3);
    assert_eq!(summary.verified_count, 2);
    assert_eq!(summary.persisted_count, 2);
    assert_eq!(summary.queries_submitted, 2);
    assert_eq!(summary.queries_failed, 0);
    // two submits + two polls
    assert_eq!(summary.upstream_requests, 4);
    assert_eq!(summary.final_phase, RunPhase::Done);
    assert!(!summary.cancelled);
    assert_eq!(
        summary.per_source_counts.get(&EvidenceSource::BusinessProfile),
        Some(&2)
    );

    let names: Vec<_> = store
        .snapshot()
        .into_iter()
        .map(|r| r.candidate.name)
        .collect();
    assert_eq!(names, vec!["Pizza A", "Pizza C"]);
}

#[tokio::test]
async fn persist_all_keeps_unverified_candidates() {
    let store = Arc::new(InMemoryStore::new());
    let config = PipelineConfig {
        persist_all: true,
        ..two_templates()
    };
    let scout = scout(backend(), MockPageFetcher::new(), store.clone(), config);

    let summary = scout
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.persisted_count, 3);

    let unverified = store
        .list(&RecordFilter::locale("Portland", "OR"))
        .await
        .unwrap()
        .into_iter()
        .filter(|r| !r.verified)
        .count();
    assert_eq!(unverified, 1);
}

#[tokio::test]
async fn second_run_upserts_instead_of_duplicating() {
    let store = Arc::new(InMemoryStore::new());
    let scout = scout(backend(), MockPageFetcher::new(), store.clone(), two_templates());
    let cancel = CancellationToken::new();

    scout.run("Portland", "OR", &cancel).await.unwrap();
    let first = store.snapshot();
    scout.run("Portland", "OR", &cancel).await.unwrap();
    let second = store.snapshot();

    assert_eq!(second.len(), 2);
    assert_eq!(first[0].id, second[0].id);
    assert!(second[0].last_checked_at >= first[0].last_checked_at);
}

#[tokio::test]
async fn website_failure_is_recorded_but_not_fatal() {
    let backend = MockJobBackend::new().on_query(
        "q",
        vec![pizzeria_with_site(
            "Pizza A",
            "https://pizza-a.example/",
            Some("our sourdough crust"),
        )],
    );
    let pages = MockPageFetcher::new().on_status("https://pizza-a.example/", 500);
    let config = PipelineConfig {
        query_templates: vec![QueryTemplate::new("q", 10)],
        social_lookup: false,
        ..fast_config()
    };
    let store = Arc::new(InMemoryStore::new());
    let summary = scout(backend, pages, store.clone(), config)
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.verified_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].kind, ErrorKind::Fetch);

    let record = &store.snapshot()[0];
    let website = record
        .evidence
        .iter()
        .find(|e| e.source == EvidenceSource::Website)
        .unwrap();
    assert!(!website.fetched_ok);
}

fn pizzeria_with_site(
    name: &str,
    site: &str,
    description: Option<&str>,
) -> places_client::PlaceRecord {
    places_client::PlaceRecord {
        site: Some(site.to_string()),
        ..pizzeria(name, 1.0, 2.0, description)
    }
}

#[tokio::test]
async fn failed_query_is_recorded_and_others_continue() {
    let backend = backend().submit_fails(
        "sourdough pizza Portland OR",
        JobError::Transient("502 bad gateway".into()),
    );
    let store = Arc::new(InMemoryStore::new());
    let summary = scout(backend, MockPageFetcher::new(), store, two_templates())
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.queries_failed, 1);
    assert_eq!(summary.candidates_found, 2);
    assert_eq!(summary.errors[0].kind, ErrorKind::UpstreamTransient);
    assert_eq!(summary.final_phase, RunPhase::Done);
}

#[tokio::test]
async fn auth_failure_aborts_the_run() {
    let backend = backend().submit_fails(
        "sourdough pizza Portland OR",
        JobError::Auth("invalid api key".into()),
    );
    let store = Arc::new(InMemoryStore::new());
    let err = scout(backend, MockPageFetcher::new(), store.clone(), two_templates())
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScoutError::UpstreamAuth(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn zero_candidates_is_a_normal_run() {
    let store = Arc::new(InMemoryStore::new());
    let summary = scout(
        MockJobBackend::new(),
        MockPageFetcher::new(),
        store,
        two_templates(),
    )
    .run("Nowhere", "ZZ", &CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(summary.candidates_found, 0);
    assert_eq!(summary.persisted_count, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.final_phase, RunPhase::Done);
}

#[tokio::test]
async fn cancelled_before_start_submits_nothing() {
    let backend = backend();
    let submits = backend.submit_counter();
    let store = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = scout(backend, MockPageFetcher::new(), store.clone(), two_templates())
        .run("Portland", "OR", &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.final_phase, RunPhase::Planning);
    assert_eq!(submits.load(Ordering::Relaxed), 0);
    assert!(store.is_empty());
}

/// Verifies every candidate, cancelling the run on its first call.
struct CancelOnFirstFetch {
    cancel: CancellationToken,
}

#[async_trait]
impl EvidenceFetcher for CancelOnFirstFetch {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Website
    }

    async fn fetch(&self, _candidate: &Candidate) -> Result<FetchOutcome, FetchError> {
        self.cancel.cancel();
        Ok(FetchOutcome::Text("sourdough".into()))
    }
}

#[tokio::test]
async fn cancellation_mid_verification_persists_finished_work() {
    let cancel = CancellationToken::new();
    let store = Arc::new(InMemoryStore::new());
    let scout = Scout::new(
        ScoutDeps::builder()
            .places(Arc::new(backend()))
            .pages(Arc::new(MockPageFetcher::new()))
            .store(store.clone())
            .config(two_templates())
            .fetchers(vec![
                Arc::new(CancelOnFirstFetch {
                    cancel: cancel.clone(),
                }) as Arc<dyn EvidenceFetcher>,
                Arc::new(StaticFetcher::unavailable(EvidenceSource::SocialBio)),
            ])
            .build(),
    );

    let summary = scout.run("Portland", "OR", &cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.final_phase, RunPhase::Verifying);
    assert_eq!(summary.candidates_found, 3);
    assert_eq!(summary.verified_count, 1);
    assert_eq!(summary.persisted_count, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn run_log_is_written_under_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let scout = Scout::new(
        ScoutDeps::builder()
            .places(Arc::new(backend()))
            .pages(Arc::new(MockPageFetcher::new()))
            .store(store)
            .config(two_templates())
            .data_dir(Some(dir.path().to_path_buf()))
            .build(),
    );

    scout
        .run("Portland", "OR", &CancellationToken::new())
        .await
        .unwrap();

    let run_dir = dir.path().join("scout-runs").join("portland-or");
    let files: Vec<_> = std::fs::read_dir(&run_dir).unwrap().collect();
    assert_eq!(files.len(), 1);

    let path = files[0].as_ref().unwrap().path();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let types: Vec<&str> = json["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert_eq!(types[0], "query_submitted");
    assert!(types.contains(&"candidates_merged"));
    assert!(types.contains(&"candidate_verified"));
    assert!(types.contains(&"record_persisted"));
    assert_eq!(json["summary"]["verified_count"], 2);
}
