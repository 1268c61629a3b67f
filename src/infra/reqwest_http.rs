//! Reqwest-backed `Fetcher`: rate limits per host, identifies the crawler,
//! drains every response body exactly once, and maps failures into the
//! typed fetch errors the retry logic classifies.
use std::sync::Arc;

use reqwest::header;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::infra::rate_limit::RateLimiter;
use crate::ports::http::{FetchError, FetchedPage, Fetcher};

pub struct HttpClient {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl HttpClient {
    pub fn new(user_agent: &str, limiter: Arc<RateLimiter>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(std::time::Duration::from_secs(120))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, limiter })
    }

    fn host_of(url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        parsed
            .host_str()
            .map(|h| h.to_string())
            .ok_or_else(|| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "no host".to_string(),
            })
    }

    fn retry_after_seconds(headers: &header::HeaderMap) -> Option<u64> {
        headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpClient {
    async fn get(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        let host = Self::host_of(url)?;
        if !self.limiter.acquire(&host, cancel).await {
            return Err(FetchError::Cancelled);
        }

        debug!(url, "HTTP GET start");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            sent = self.client.get(url).send() => sent.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    FetchError::Request { url: url.to_string(), source: e }
                }
            })?,
        };

        let status = response.status();
        let retry_after = Self::retry_after_seconds(response.headers());

        // drain the body regardless of status so the connection is reusable
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            bytes = response.bytes() => bytes.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    FetchError::Request { url: url.to_string(), source: e }
                }
            })?,
        };

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        Ok(FetchedPage {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}
