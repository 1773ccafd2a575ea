//! Submit-then-poll for asynchronous upstream jobs.
//!
//! A backend answers a submission with a finished payload, an upstream
//! error, or a pending ticket. Pending tickets are polled with linear,
//! capped backoff until they terminate or the attempt budget runs out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use leaven_common::PollConfig;

/// What the backend reported for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus<P> {
    Pending { id: String },
    Success(P),
    Error(String),
}

/// A single submit or poll call that failed before the job reported a state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("credentials rejected: {0}")]
    Auth(String),
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("{0}")]
    Transient(String),
}

#[async_trait]
pub trait JobBackend: Send + Sync {
    type Request: Send + Sync;
    type Payload: Send;

    async fn submit(&self, request: &Self::Request) -> Result<JobStatus<Self::Payload>, JobError>;

    async fn poll(&self, id: &str) -> Result<JobStatus<Self::Payload>, JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Pending,
    Success,
    Error,
}

/// An in-flight job, owned by the poll loop that submitted it.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: String,
    pub submitted_at: Instant,
    pub attempts: u32,
    pub state: TicketState,
}

impl JobTicket {
    fn new(id: String) -> Self {
        Self {
            id,
            submitted_at: Instant::now(),
            attempts: 0,
            state: TicketState::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub step_delay: Duration,
    pub cap_delay: Duration,
}

impl PollPolicy {
    /// Delay before poll attempt `attempt` (0-based): `min(base + attempt * step, cap)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_add(self.step_delay.saturating_mul(attempt))
            .min(self.cap_delay)
    }

    /// No waiting between polls.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            cap_delay: Duration::ZERO,
        }
    }
}

impl From<PollConfig> for PollPolicy {
    fn from(c: PollConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            base_delay: Duration::from_millis(c.base_delay_ms),
            step_delay: Duration::from_millis(c.step_delay_ms),
            cap_delay: Duration::from_millis(c.cap_delay_ms),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollConfig::default().into()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    #[error("job failed upstream: {0}")]
    Upstream(String),

    #[error("job still pending after {attempts} polls")]
    Timeout {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("credentials rejected: {0}")]
    Auth(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("submit failed: {0}")]
    Transient(String),
}

impl From<JobError> for PollError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Auth(m) => PollError::Auth(m),
            JobError::Quota(m) => PollError::Quota(m),
            JobError::Transient(m) => PollError::Transient(m),
        }
    }
}

pub struct BackoffPoller<B: ?Sized> {
    backend: Arc<B>,
    policy: PollPolicy,
    requests: Arc<AtomicU64>,
}

impl<B: JobBackend + ?Sized> BackoffPoller<B> {
    pub fn new(backend: Arc<B>, policy: PollPolicy) -> Self {
        Self {
            backend,
            policy,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Share a request counter with other components.
    pub fn with_counter(mut self, requests: Arc<AtomicU64>) -> Self {
        self.requests = requests;
        self
    }

    /// Submits plus polls issued so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub async fn submit_and_await(&self, request: &B::Request) -> Result<B::Payload, PollError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let id = match self.backend.submit(request).await? {
            JobStatus::Success(payload) => return Ok(payload),
            JobStatus::Error(message) => return Err(PollError::Upstream(message)),
            JobStatus::Pending { id } => id,
        };

        let mut ticket = JobTicket::new(id);
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            ticket.attempts += 1;
            self.requests.fetch_add(1, Ordering::Relaxed);

            match self.backend.poll(&ticket.id).await {
                Ok(JobStatus::Success(payload)) => {
                    ticket.state = TicketState::Success;
                    debug!(
                        id = ticket.id.as_str(),
                        attempts = ticket.attempts,
                        elapsed_ms = ticket.submitted_at.elapsed().as_millis() as u64,
                        "Job finished"
                    );
                    return Ok(payload);
                }
                Ok(JobStatus::Error(message)) => {
                    ticket.state = TicketState::Error;
                    return Err(PollError::Upstream(message));
                }
                Ok(JobStatus::Pending { .. }) => last_error = None,
                Err(JobError::Auth(m)) => return Err(PollError::Auth(m)),
                Err(JobError::Quota(m)) => return Err(PollError::Quota(m)),
                Err(JobError::Transient(m)) => {
                    warn!(id = ticket.id.as_str(), attempt, error = m.as_str(), "Poll attempt failed");
                    last_error = Some(m);
                }
            }
        }

        warn!(id = ticket.id.as_str(), attempts = ticket.attempts, "Job never finished");
        Err(PollError::Timeout {
            attempts: ticket.attempts,
            last_error,
        })
    }
}
