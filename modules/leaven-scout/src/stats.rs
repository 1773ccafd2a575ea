use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use leaven_common::EvidenceSource;

use crate::error::RunError;

/// Orchestrator state machine: Idle → Planning → Verifying → Persisting → Done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Planning,
    Verifying,
    Persisting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Planning => "planning",
            RunPhase::Verifying => "verifying",
            RunPhase::Persisting => "persisting",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub city: String,
    pub state: String,
    pub candidates_found: u32,
    pub verified_count: u32,
    pub persisted_count: u32,
    /// Verified candidates per source that produced a match.
    pub per_source_counts: BTreeMap<EvidenceSource, u32>,
    pub queries_submitted: u32,
    pub queries_failed: u32,
    pub upstream_requests: u64,
    pub errors: Vec<RunError>,
    pub cancelled: bool,
    /// `Done` for complete runs; for cancelled runs, the phase that noticed.
    pub final_phase: RunPhase,
}

impl RunSummary {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            ..Self::default()
        }
    }

    pub fn count_sources<'a>(&mut self, sources: impl IntoIterator<Item = &'a EvidenceSource>) {
        for source in sources {
            *self.per_source_counts.entry(*source).or_default() += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Discovery Run: {}, {} ===", self.city, self.state)?;
        writeln!(f, "Queries submitted:  {}", self.queries_submitted)?;
        writeln!(f, "Queries failed:     {}", self.queries_failed)?;
        writeln!(f, "Upstream requests:  {}", self.upstream_requests)?;
        writeln!(f, "Candidates found:   {}", self.candidates_found)?;
        writeln!(f, "Verified:           {}", self.verified_count)?;
        writeln!(f, "Persisted:          {}", self.persisted_count)?;
        if !self.per_source_counts.is_empty() {
            writeln!(f, "\nBy source:")?;
            for (source, count) in &self.per_source_counts {
                writeln!(f, "  {:<17} {}", source.as_str(), count)?;
            }
        }
        if !self.errors.is_empty() {
            writeln!(f, "\nErrors ({}):", self.errors.len())?;
            for e in &self.errors {
                writeln!(f, "  - {}", e.message)?;
            }
        }
        if self.cancelled {
            writeln!(f, "\nCancelled during {}", self.final_phase)?;
        } else {
            writeln!(f, "\nFinished: {}", self.final_phase)?;
        }
        Ok(())
    }
}
