use serde::Serialize;
use thiserror::Error;

use leaven_store::StoreError;

use crate::evidence::FetchError;
use crate::poller::PollError;

/// Shown alongside quota failures so the operator knows what to do next.
pub const QUOTA_HINT: &str =
    "top up the places account balance or lower query limits, then re-run";

#[derive(Debug, Error)]
pub enum ScoutError {
    /// Credentials rejected upstream. Aborts the run.
    #[error("Upstream rejected credentials: {0}")]
    UpstreamAuth(String),

    /// Account balance or rate limit exhausted. Aborts the run.
    #[error("Upstream quota exhausted: {message} (hint: {hint})")]
    UpstreamQuota { message: String, hint: String },

    #[error("Upstream transient failure: {0}")]
    UpstreamTransient(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Polling gave up after {attempts} attempts (last error: {})", .last_error.as_deref().unwrap_or("none"))]
    PollTimeout {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScoutError {
    pub fn quota(message: impl Into<String>) -> Self {
        ScoutError::UpstreamQuota {
            message: message.into(),
            hint: QUOTA_HINT.to_string(),
        }
    }

    /// Auth and quota failures end the run; everything else is recorded and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScoutError::UpstreamAuth(_) | ScoutError::UpstreamQuota { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoutError::UpstreamAuth(_) => ErrorKind::UpstreamAuth,
            ScoutError::UpstreamQuota { .. } => ErrorKind::UpstreamQuota,
            ScoutError::UpstreamTransient(_) => ErrorKind::UpstreamTransient,
            ScoutError::Fetch(_) => ErrorKind::Fetch,
            ScoutError::PollTimeout { .. } => ErrorKind::PollTimeout,
            ScoutError::Persistence(_) => ErrorKind::Persistence,
            ScoutError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<PollError> for ScoutError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Auth(msg) => ScoutError::UpstreamAuth(msg),
            PollError::Quota(msg) => ScoutError::quota(msg),
            PollError::Transient(msg) => ScoutError::UpstreamTransient(msg),
            PollError::Upstream(msg) => {
                ScoutError::UpstreamTransient(format!("job reported an error: {msg}"))
            }
            PollError::Timeout {
                attempts,
                last_error,
            } => ScoutError::PollTimeout {
                attempts,
                last_error,
            },
        }
    }
}

impl From<FetchError> for ScoutError {
    fn from(err: FetchError) -> Self {
        ScoutError::Fetch(err.to_string())
    }
}

impl From<StoreError> for ScoutError {
    fn from(err: StoreError) -> Self {
        ScoutError::Persistence(err.to_string())
    }
}

impl From<leaven_common::LeavenError> for ScoutError {
    fn from(err: leaven_common::LeavenError) -> Self {
        ScoutError::Config(err.to_string())
    }
}

// --- Recorded (non-fatal) errors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UpstreamAuth,
    UpstreamQuota,
    UpstreamTransient,
    Fetch,
    PollTimeout,
    Persistence,
    Config,
}

/// Where a recorded error happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    Query { query: String },
    Candidate { name: String },
    Persist { identity_key: String },
}

/// A failure that was caught, recorded, and did not stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub kind: ErrorKind,
    #[serde(flatten)]
    pub scope: ErrorScope,
    pub message: String,
}

impl RunError {
    pub fn new(error: &ScoutError, scope: ErrorScope) -> Self {
        Self {
            kind: error.kind(),
            scope,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_and_quota_are_fatal() {
        assert!(ScoutError::UpstreamAuth("bad key".into()).is_fatal());
        assert!(ScoutError::quota("balance").is_fatal());
        assert!(!ScoutError::UpstreamTransient("503".into()).is_fatal());
        assert!(!ScoutError::PollTimeout {
            attempts: 8,
            last_error: None
        }
        .is_fatal());
        assert!(!ScoutError::Persistence("down".into()).is_fatal());
    }

    #[test]
    fn poll_failures_map_to_scout_errors() {
        let err: ScoutError = PollError::Quota("402".into()).into();
        match err {
            ScoutError::UpstreamQuota { hint, .. } => assert_eq!(hint, QUOTA_HINT),
            other => panic!("expected quota, got {other:?}"),
        }

        let err: ScoutError = PollError::Timeout {
            attempts: 8,
            last_error: Some("503".into()),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::PollTimeout);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn run_error_serializes_flat() {
        let err = RunError::new(
            &ScoutError::Fetch("404".into()),
            ErrorScope::Candidate {
                name: "Pizza A".into(),
            },
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "fetch");
        assert_eq!(json["scope"], "candidate");
        assert_eq!(json["name"], "Pizza A");
    }
}
