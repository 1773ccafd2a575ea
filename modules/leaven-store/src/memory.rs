use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leaven_common::{Candidate, EvidenceResult, PersistedRecord, VerificationDecision};

use crate::error::{Result, StoreError};
use crate::{RecordFilter, RecordStore};

/// Process-local store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, PersistedRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored record, ordered by name.
    pub fn snapshot(&self) -> Vec<PersistedRecord> {
        let mut all: Vec<PersistedRecord> = match self.records.lock() {
            Ok(records) => records.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        all.sort_by(|a, b| a.candidate.name.cmp(&b.candidate.name));
        all
    }
}

fn poisoned() -> StoreError {
    StoreError::Invalid("in-memory store lock poisoned".into())
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn upsert(
        &self,
        candidate: &Candidate,
        decision: &VerificationDecision,
        evidence: &[EvidenceResult],
        checked_at: DateTime<Utc>,
    ) -> Result<PersistedRecord> {
        let key = candidate.identity_key().to_string();
        let mut records = self.records.lock().map_err(|_| poisoned())?;

        let record = records
            .entry(key)
            .and_modify(|existing| {
                existing.apply_check(candidate, decision, evidence.to_vec(), checked_at)
            })
            .or_insert_with(|| {
                PersistedRecord::new(candidate.clone(), decision, evidence.to_vec(), checked_at)
            });

        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PersistedRecord>> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.values().find(|r| r.id == id).cloned())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<PersistedRecord>> {
        let mut matching: Vec<PersistedRecord> = {
            let records = self.records.lock().map_err(|_| poisoned())?;
            records.values().filter(|r| filter.matches(r)).cloned().collect()
        };
        matching.sort_by(|a, b| a.candidate.name.cmp(&b.candidate.name));
        matching.truncate(filter.effective_limit() as usize);
        Ok(matching)
    }
}
