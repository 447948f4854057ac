use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The request never reached the backend (offline, refused, timed out).
    #[error("backend unreachable: {0}")]
    Connectivity(String),

    /// The backend answered with a non-2xx status.
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The body matched none of the accepted response shapes.
    #[error("unexpected response shape: {0}")]
    DataShape(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Connectivity(_) | FetchError::Api { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return FetchError::Api {
                status: status.as_u16(),
                body: error.to_string(),
            };
        }
        FetchError::Connectivity(error.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::DataShape(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
