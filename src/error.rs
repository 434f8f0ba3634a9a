#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::error::Error),
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error("Unknown category `{0}`")]
    InvalidCategory(String),
    #[error("Unknown crawl status `{0}`")]
    InvalidStatus(String),
    #[error("Crawl log {0} not found")]
    RunLogNotFound(i64),
    #[error("Crawl cancelled")]
    Cancelled,
}

/// Failure of a single HTTP exchange, before any status code is known.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connect(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}
