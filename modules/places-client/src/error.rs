use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlacesError>;

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// 401/403: the API key was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 402/429: account balance or rate limit exhausted.
    #[error("Quota exceeded (status {status}): {message}")]
    QuotaExceeded { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl PlacesError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => PlacesError::Unauthorized(message),
            402 | 429 => PlacesError::QuotaExceeded { status, message },
            _ => PlacesError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for PlacesError {
    fn from(err: reqwest::Error) -> Self {
        PlacesError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PlacesError {
    fn from(err: serde_json::Error) -> Self {
        PlacesError::Parse(err.to_string())
    }
}
