//! Outbound HTTP abstraction handed to plugin handlers. Implementations are
//! expected to rate limit per host and to drain response bodies exactly once.
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::model::FailureKind;

/// A fully drained 2xx response.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http status {status} for {url}")]
    Status {
        url: String,
        status: u16,
        /// Seconds from a `Retry-After` header, when the server sent one.
        retry_after: Option<u64>,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Status {
                status, retry_after, ..
            } => {
                if *status == 429 || retry_after.is_some() {
                    FailureKind::RateLimited
                } else if (400..500).contains(status) {
                    FailureKind::Permanent
                } else {
                    FailureKind::Transient
                }
            }
            FetchError::Request { .. } | FetchError::Timeout { .. } => FailureKind::Transient,
            FetchError::InvalidUrl { .. } => FailureKind::Permanent,
            FetchError::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, cancel: &CancellationToken)
        -> Result<FetchedPage, FetchError>;
}
