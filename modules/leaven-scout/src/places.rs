// JobBackend over the places-search REST client.

use async_trait::async_trait;

use places_client::{JobResponse, JobState, PlaceRecord, PlacesClient, PlacesError, SearchRequest};

use crate::poller::{JobBackend, JobError, JobStatus};

/// The backend shape the query planner consumes.
pub type PlacesBackend = dyn JobBackend<Request = SearchRequest, Payload = Vec<PlaceRecord>>;

impl From<PlacesError> for JobError {
    fn from(err: PlacesError) -> Self {
        match err {
            PlacesError::Unauthorized(msg) => JobError::Auth(msg),
            PlacesError::QuotaExceeded { status, message } => {
                JobError::Quota(format!("status {status}: {message}"))
            }
            other => JobError::Transient(other.to_string()),
        }
    }
}

fn job_status(job: JobResponse) -> JobStatus<Vec<PlaceRecord>> {
    match job.state() {
        JobState::Success => JobStatus::Success(job.into_places()),
        JobState::Error => JobStatus::Error(
            job.error_text()
                .unwrap_or_else(|| "upstream job failed".to_string()),
        ),
        JobState::Pending | JobState::Unknown => match job.id {
            Some(id) if !id.is_empty() => JobStatus::Pending { id },
            _ => JobStatus::Error("response carried neither results nor a request id".into()),
        },
    }
}

#[async_trait]
impl JobBackend for PlacesClient {
    type Request = SearchRequest;
    type Payload = Vec<PlaceRecord>;

    async fn submit(&self, request: &SearchRequest) -> Result<JobStatus<Vec<PlaceRecord>>, JobError> {
        Ok(job_status(PlacesClient::submit(self, request).await?))
    }

    async fn poll(&self, id: &str) -> Result<JobStatus<Vec<PlaceRecord>>, JobError> {
        Ok(job_status(PlacesClient::poll(self, id).await?))
    }
}
