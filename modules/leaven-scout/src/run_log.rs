//! Run log: a persisted JSON timeline of every action taken during a run.
//!
//! Each run produces a single `{DATA_DIR}/scout-runs/{city}-{state}/{run_id}.json`
//! file containing an ordered list of events with timestamps and the final summary.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use leaven_common::{normalize_text, EvidenceSource};

use crate::stats::{RunPhase, RunSummary};

pub struct RunLog {
    pub run_id: String,
    pub region: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Debug, Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    QuerySubmitted {
        query: String,
        limit: u32,
        result_count: u32,
        relevant_count: u32,
    },
    QueryFailed {
        query: String,
        error: String,
    },
    CandidatesMerged {
        unique: u32,
    },
    EvidenceChecked {
        candidate: String,
        source: EvidenceSource,
        fetched_ok: bool,
        keywords: Vec<String>,
        failure_reason: Option<String>,
    },
    CandidateVerified {
        candidate: String,
        keywords: Vec<String>,
        sources: Vec<EvidenceSource>,
    },
    RecordPersisted {
        id: String,
        identity_key: String,
        verified: bool,
    },
    PersistFailed {
        identity_key: String,
        error: String,
    },
    RunCancelled {
        phase: RunPhase,
    },
}

/// `Portland`, `OR` → `portland-or`.
pub fn region_slug(city: &str, state: &str) -> String {
    normalize_text(&format!("{city} {state}")).replace(' ', "-")
}

impl RunLog {
    pub fn new(run_id: String, city: &str, state: &str) -> Self {
        Self {
            run_id,
            region: region_slug(city, state),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON under `data_dir` and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, data_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
        let dir = data_dir.join("scout-runs").join(&self.region);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            region: &self.region,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    region: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    summary: &'a RunSummary,
    events: &'a [RunEvent],
}
