// Test mocks for the scout pipeline.
//
// Three mocks matching the trait boundaries:
// - MockJobBackend (JobBackend): scripted per-query places responses
// - MockPageFetcher (PageFetcher): HashMap-based URL→HTML
// - StaticFetcher (EvidenceFetcher): fixed outcome for one source
//
// Plus helpers for building place records and candidates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use leaven_common::{Candidate, EvidenceSource, PipelineConfig, PollConfig, SpacingConfig};
use places_client::{PlaceRecord, SearchRequest};

use crate::evidence::{EvidenceFetcher, FetchError, FetchOutcome, PageFetcher};
use crate::poller::{JobBackend, JobError, JobStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A named place with coordinates and nothing else.
pub fn place(name: &str, lat: f64, lng: f64) -> PlaceRecord {
    PlaceRecord {
        name: Some(name.to_string()),
        latitude: Some(lat),
        longitude: Some(lng),
        ..PlaceRecord::default()
    }
}

/// A place that passes the default relevance filter.
pub fn pizzeria(name: &str, lat: f64, lng: f64, description: Option<&str>) -> PlaceRecord {
    PlaceRecord {
        category: Some("Pizza restaurant".to_string()),
        description: description.map(String::from),
        ..place(name, lat, lng)
    }
}

pub fn candidate(name: &str, lat: f64, lng: f64) -> Candidate {
    let mut c = Candidate::new(name, "", "Portland", "OR");
    c.latitude = Some(lat);
    c.longitude = Some(lng);
    c
}

/// Default pipeline config with no spacing and no poll delays.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        spacing: SpacingConfig { min_ms: 0, max_ms: 0 },
        poll: PollConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            step_delay_ms: 0,
            cap_delay_ms: 0,
        },
        ..PipelineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// MockJobBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Ready(Vec<PlaceRecord>),
    Pending { polls: u32, places: Vec<PlaceRecord> },
    JobFailed(String),
    SubmitFails(JobError),
}

/// Places backend scripted per query string. Unscripted queries succeed
/// with no results. Pending tickets use the query string as their id.
#[derive(Default)]
pub struct MockJobBackend {
    scripts: HashMap<String, Script>,
    poll_error: Option<JobError>,
    poll_counts: Mutex<HashMap<String, u32>>,
    submits: Arc<AtomicU32>,
    polls: Arc<AtomicU32>,
}

impl MockJobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, places: Vec<PlaceRecord>) -> Self {
        self.scripts.insert(query.to_string(), Script::Ready(places));
        self
    }

    /// Pending on submit, finished on the `polls`-th poll.
    pub fn pending_then(mut self, query: &str, polls: u32, places: Vec<PlaceRecord>) -> Self {
        self.scripts
            .insert(query.to_string(), Script::Pending { polls, places });
        self
    }

    pub fn pending_forever(self, query: &str) -> Self {
        self.pending_then(query, u32::MAX, Vec::new())
    }

    pub fn job_error(mut self, query: &str, message: &str) -> Self {
        self.scripts
            .insert(query.to_string(), Script::JobFailed(message.to_string()));
        self
    }

    pub fn submit_fails(mut self, query: &str, error: JobError) -> Self {
        self.scripts
            .insert(query.to_string(), Script::SubmitFails(error));
        self
    }

    /// Every poll call fails with `error`.
    pub fn failing_polls(mut self, error: JobError) -> Self {
        self.poll_error = Some(error);
        self
    }

    pub fn submit_counter(&self) -> Arc<AtomicU32> {
        self.submits.clone()
    }

    pub fn poll_counter(&self) -> Arc<AtomicU32> {
        self.polls.clone()
    }
}

#[async_trait]
impl JobBackend for MockJobBackend {
    type Request = SearchRequest;
    type Payload = Vec<PlaceRecord>;

    async fn submit(&self, request: &SearchRequest) -> Result<JobStatus<Vec<PlaceRecord>>, JobError> {
        self.submits.fetch_add(1, Ordering::Relaxed);
        match self.scripts.get(&request.query) {
            None => Ok(JobStatus::Success(Vec::new())),
            Some(Script::Ready(places)) => Ok(JobStatus::Success(places.clone())),
            Some(Script::Pending { .. }) => Ok(JobStatus::Pending {
                id: request.query.clone(),
            }),
            Some(Script::JobFailed(message)) => Ok(JobStatus::Error(message.clone())),
            Some(Script::SubmitFails(error)) => Err(error.clone()),
        }
    }

    async fn poll(&self, id: &str) -> Result<JobStatus<Vec<PlaceRecord>>, JobError> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = &self.poll_error {
            return Err(error.clone());
        }
        let Some(Script::Pending { polls, places }) = self.scripts.get(id) else {
            return Ok(JobStatus::Error(format!("unknown request id {id}")));
        };

        let seen = {
            let mut counts = self.poll_counts.lock().unwrap();
            let count = counts.entry(id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if seen >= *polls {
            Ok(JobStatus::Success(places.clone()))
        } else {
            Ok(JobStatus::Pending { id: id.to_string() })
        }
    }
}

// ---------------------------------------------------------------------------
// MockPageFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Unregistered URLs answer 404.
#[derive(Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    requested: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn on_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(html) = self.pages.get(url) {
            return Ok(html.clone());
        }
        Err(FetchError::Status {
            url: url.to_string(),
            status: self.statuses.get(url).copied().unwrap_or(404),
        })
    }
}

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

/// Evidence fetcher that returns the same outcome for every candidate.
pub struct StaticFetcher {
    source: EvidenceSource,
    outcome: Result<FetchOutcome, FetchError>,
}

impl StaticFetcher {
    pub fn text(source: EvidenceSource, text: &str) -> Self {
        Self {
            source,
            outcome: Ok(FetchOutcome::Text(text.to_string())),
        }
    }

    pub fn unavailable(source: EvidenceSource) -> Self {
        Self {
            source,
            outcome: Ok(FetchOutcome::Unavailable("nothing to fetch".into())),
        }
    }

    pub fn failing(source: EvidenceSource, error: FetchError) -> Self {
        Self {
            source,
            outcome: Err(error),
        }
    }
}

#[async_trait]
impl EvidenceFetcher for StaticFetcher {
    fn source(&self) -> EvidenceSource {
        self.source
    }

    async fn fetch(&self, _candidate: &Candidate) -> Result<FetchOutcome, FetchError> {
        self.outcome.clone()
    }
}
