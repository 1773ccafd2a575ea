//! Pipeline orchestrator: plan → verify → persist for one locale.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use leaven_common::config::MAX_CONCURRENCY;
use leaven_common::{Candidate, PipelineConfig};
use leaven_store::RecordStore;

use crate::discovery::QueryPlanner;
use crate::error::{ErrorScope, RunError, ScoutError};
use crate::evidence::{EvidenceFetcher, PageFetcher};
use crate::keywords::KeywordMatcher;
use crate::places::PlacesBackend;
use crate::poller::BackoffPoller;
use crate::run_log::{EventKind, RunLog};
use crate::spacing::RequestSpacer;
use crate::stats::{RunPhase, RunSummary};
use crate::verification::{Verification, VerificationEngine};

/// Long-lived collaborators for a scout. Credentials live inside the
/// backends; nothing here reads the environment.
#[derive(Clone, TypedBuilder)]
pub struct ScoutDeps {
    pub places: Arc<PlacesBackend>,
    pub pages: Arc<dyn PageFetcher>,
    pub store: Arc<dyn RecordStore>,
    #[builder(default)]
    pub config: PipelineConfig,
    /// Replaces the standard business-profile/website/social fetchers.
    #[builder(default, setter(strip_option))]
    pub fetchers: Option<Vec<Arc<dyn EvidenceFetcher>>>,
    /// Root for run logs. `None` disables the run log.
    #[builder(default)]
    pub data_dir: Option<PathBuf>,
}

pub struct Scout {
    planner: QueryPlanner,
    engine: VerificationEngine,
    store: Arc<dyn RecordStore>,
    requests: Arc<AtomicU64>,
    persist_all: bool,
    concurrency: usize,
    data_dir: Option<PathBuf>,
}

impl Scout {
    pub fn new(deps: ScoutDeps) -> Self {
        let config = deps.config;
        let requests = Arc::new(AtomicU64::new(0));
        let poller =
            BackoffPoller::new(deps.places, config.poll.into()).with_counter(requests.clone());
        let spacer = Arc::new(RequestSpacer::new(config.spacing));

        let engine = match deps.fetchers {
            Some(fetchers) => VerificationEngine::new(KeywordMatcher::new(&config.keywords), fetchers),
            None => VerificationEngine::standard(&config, deps.pages),
        };

        Self {
            planner: QueryPlanner::new(poller, spacer, &config),
            engine,
            store: deps.store,
            requests,
            persist_all: config.persist_all,
            concurrency: config.concurrency.clamp(1, MAX_CONCURRENCY),
            data_dir: deps.data_dir,
        }
    }

    /// Discover, verify and persist candidates for one locale.
    ///
    /// Only auth and quota failures return `Err`. Everything else is recorded
    /// in the summary. On cancellation, candidates already verified are still
    /// persisted and the summary comes back with `cancelled: true`.
    pub async fn run(
        &self,
        city: &str,
        state: &str,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ScoutError> {
        let run_id = Uuid::new_v4().to_string();
        let mut log = RunLog::new(run_id.clone(), city, state);
        let mut summary = RunSummary::new(city, state);
        let requests_before = self.requests.load(Ordering::Relaxed);
        let mut cancelled_in: Option<RunPhase> = None;
        info!(city, state, run_id = run_id.as_str(), "Scout run starting");

        // Planning
        summary.final_phase = RunPhase::Planning;
        let plan = match self.planner.build_candidate_set(city, state, cancel).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(city, state, error = %e, "Run aborted");
                summary.upstream_requests = self.requests.load(Ordering::Relaxed) - requests_before;
                self.save_log(&log, &summary);
                return Err(e);
            }
        };

        for report in &plan.reports {
            log.log(match &report.error {
                None => EventKind::QuerySubmitted {
                    query: report.query.clone(),
                    limit: report.limit,
                    result_count: report.result_count,
                    relevant_count: report.relevant_count,
                },
                Some(error) => EventKind::QueryFailed {
                    query: report.query.clone(),
                    error: error.clone(),
                },
            });
        }
        summary.queries_submitted = plan.queries_submitted;
        summary.queries_failed = plan.queries_failed;
        summary.candidates_found = plan.candidates.len() as u32;
        summary.errors.extend(plan.errors);
        log.log(EventKind::CandidatesMerged {
            unique: summary.candidates_found,
        });
        if plan.cancelled {
            cancelled_in = Some(RunPhase::Planning);
        }

        // Verifying
        let mut checked: Vec<(Candidate, Verification)> = Vec::new();
        let candidates = plan.candidates.into_vec();
        if cancelled_in.is_none() && !candidates.is_empty() {
            summary.final_phase = RunPhase::Verifying;
            let engine = &self.engine;
            let mut checks = stream::iter(candidates)
                .map(|candidate| async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let verification = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        v = engine.verify(&candidate) => Some(v),
                    };
                    verification.map(|v| (candidate, v))
                })
                .buffered(self.concurrency);

            while let Some(result) = checks.next().await {
                let Some((candidate, verification)) = result else {
                    cancelled_in.get_or_insert(RunPhase::Verifying);
                    continue;
                };
                self.record_verification(&mut summary, &mut log, &candidate, &verification);
                checked.push((candidate, verification));
            }
        }
        if let Some(phase) = cancelled_in {
            warn!(city, state, %phase, "Run cancelled");
            summary.cancelled = true;
            log.log(EventKind::RunCancelled { phase });
        }

        // Persisting
        let to_persist: Vec<&(Candidate, Verification)> = checked
            .iter()
            .filter(|(_, v)| self.persist_all || v.decision.verified)
            .collect();
        if !to_persist.is_empty() {
            summary.final_phase = RunPhase::Persisting;
            let checked_at = Utc::now();
            for (candidate, verification) in to_persist {
                let identity_key = candidate.identity_key().to_string();
                match self
                    .store
                    .upsert(candidate, &verification.decision, &verification.evidence, checked_at)
                    .await
                {
                    Ok(record) => {
                        summary.persisted_count += 1;
                        log.log(EventKind::RecordPersisted {
                            id: record.id.to_string(),
                            identity_key,
                            verified: record.verified,
                        });
                    }
                    Err(e) => {
                        warn!(identity_key = identity_key.as_str(), error = %e, "Persist failed");
                        let err = ScoutError::from(e);
                        log.log(EventKind::PersistFailed {
                            identity_key: identity_key.clone(),
                            error: err.to_string(),
                        });
                        summary
                            .errors
                            .push(RunError::new(&err, ErrorScope::Persist { identity_key }));
                    }
                }
            }
        }

        summary.final_phase = cancelled_in.unwrap_or(RunPhase::Done);
        summary.upstream_requests = self.requests.load(Ordering::Relaxed) - requests_before;
        info!(
            city,
            state,
            candidates = summary.candidates_found,
            verified = summary.verified_count,
            persisted = summary.persisted_count,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            "Scout run finished"
        );
        self.save_log(&log, &summary);
        Ok(summary)
    }

    fn record_verification(
        &self,
        summary: &mut RunSummary,
        log: &mut RunLog,
        candidate: &Candidate,
        verification: &Verification,
    ) {
        for evidence in &verification.evidence {
            log.log(EventKind::EvidenceChecked {
                candidate: candidate.name.clone(),
                source: evidence.source,
                fetched_ok: evidence.fetched_ok,
                keywords: evidence.matched_keywords.iter().cloned().collect(),
                failure_reason: evidence.failure_reason.clone(),
            });
        }
        for (_, failure) in &verification.failures {
            summary.errors.push(RunError::new(
                &ScoutError::from(failure.clone()),
                ErrorScope::Candidate {
                    name: candidate.name.clone(),
                },
            ));
        }

        let decision = &verification.decision;
        if decision.verified {
            summary.verified_count += 1;
            summary.count_sources(&decision.sources);
            log.log(EventKind::CandidateVerified {
                candidate: candidate.name.clone(),
                keywords: decision.keywords.iter().cloned().collect(),
                sources: decision.sources.iter().copied().collect(),
            });
        }
    }

    /// Log-write failures are reported and otherwise ignored.
    fn save_log(&self, log: &RunLog, summary: &RunSummary) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        if let Err(e) = log.save(dir, summary) {
            warn!(error = %e, "Failed to save run log");
        }
    }
}
