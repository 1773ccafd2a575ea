// Persistence for verified restaurants.
//
// RecordStore is the only write path out of the pipeline and the only read
// path for the API. Upserts are keyed by the candidate identity key and never
// shrink keyword/source/category sets.

pub mod error;
mod memory;
mod postgres;
#[cfg(feature = "test-utils")]
pub mod testutil;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use leaven_common::{Candidate, EvidenceResult, PersistedRecord, VerificationDecision};

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Hard ceiling on rows returned by one `list` call.
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Read filter for the presentation layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub verified_only: bool,
    pub limit: Option<u32>,
}

impl RecordFilter {
    pub fn locale(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }

    pub fn matches(&self, record: &PersistedRecord) -> bool {
        let eq = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map_or(true, |w| w.trim().eq_ignore_ascii_case(have.trim()))
        };
        eq(&self.city, &record.candidate.city)
            && eq(&self.state, &record.candidate.state)
            && (!self.verified_only || record.verified)
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or merge the result of one verification pass.
    async fn upsert(
        &self,
        candidate: &Candidate,
        decision: &VerificationDecision,
        evidence: &[EvidenceResult],
        checked_at: DateTime<Utc>,
    ) -> Result<PersistedRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<PersistedRecord>>;

    /// Records matching `filter`, ordered by name.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<PersistedRecord>>;
}
