//! The interface a compiled-in site plugin implements, plus the task and
//! handler types that flow between a plugin and the scrape runner.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::fact::Fact;
use crate::domain::model::{FailureKind, ScrapeConfig, ScrapeSchedule, ScheduleRequest};
use crate::ports::http::{FetchError, Fetcher};

/// In-flight handler cap within one scrape, unless the plugin declares its
/// own.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// One URL's worth of work inside a running scrape. Tasks are never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub url: String,
    pub meta: Option<serde_json::Value>,
    pub(crate) retries: u32,
}

impl Task {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            meta: None,
            retries: 0,
        }
    }

    pub fn with_meta(url: impl Into<String>, meta: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            meta: Some(meta),
            retries: 0,
        }
    }
}

/// What a handler gets alongside the task itself: a rate-limited HTTP client
/// and the capture groups of the route that matched.
#[derive(Clone)]
pub struct HandlerOpts {
    pub client: Arc<dyn Fetcher>,
    /// Positional route parameters: index 0 is the full match, followed by
    /// one entry per capture group of the matched route pattern.
    pub route_params: Vec<String>,
}

/// Facts and follow-up tasks produced by one handler invocation.
#[derive(Debug, Default)]
pub struct HandlerResponse {
    pub facts: Vec<Fact>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("handler contract violation: {0}")]
    Contract(String),
    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HandlerError::Fetch(e) => e.kind(),
            // parse failures are retryable: pages render differently between
            // fetches often enough that one bad read should not kill a task
            HandlerError::Parse(_) | HandlerError::Other(_) => FailureKind::Transient,
            HandlerError::Contract(_) => FailureKind::Permanent,
        }
    }

    /// Server-requested delay in seconds, when one was sent.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            HandlerError::Fetch(FetchError::Status { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerResponse, HandlerError>> + Send>>;

/// A handler processes one task. The cancellation token must be threaded
/// into every outbound call the handler makes.
pub type Handler = Arc<dyn Fn(CancellationToken, HandlerOpts, Task) -> HandlerFuture + Send + Sync>;

/// A regex-routed handler. Within a plugin, routes are tried in declaration
/// order and the first match wins.
#[derive(Clone)]
pub struct Route {
    pub(crate) pattern: Regex,
    pub(crate) handler: Handler,
}

impl Route {
    pub fn new<F, Fut>(pattern: &str, handler: F) -> Result<Self, PluginError>
    where
        F: Fn(CancellationToken, HandlerOpts, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerResponse, HandlerError>> + Send + 'static,
    {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            handler: Arc::new(move |cancel, opts, task| -> HandlerFuture {
                Box::pin(handler(cancel, opts, task))
            }),
        })
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no plugin found for {0}")]
    NoPluginFound(String),
    #[error("duplicate plugin name {0}")]
    DuplicateName(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("could not create config for {url}: {reason}")]
    ConfigCreation { url: String, reason: String },
    #[error("invalid route pattern: {0}")]
    BadRoutePattern(#[from] regex::Error),
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name()).finish()
    }
}

/// A compiled-in site plugin.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name, used as the dispatch key persisted on feeds and scrapes.
    fn name(&self) -> &'static str;

    /// How many handlers may run at once within one scrape of this plugin.
    fn max_concurrency(&self) -> usize {
        DEFAULT_MAX_CONCURRENCY
    }

    /// Rejects configs whose entrypoints this plugin cannot scrape. Must be
    /// deterministic for a given input.
    fn validate_config(&self, config: &ScrapeConfig) -> Result<(), PluginError>;

    /// Given a user-submitted URL, produce the feed title and the initial
    /// scrape config. May fetch through `opts.client` to do so.
    async fn create_config(
        &self,
        url: &str,
        opts: &HandlerOpts,
    ) -> Result<(String, ScrapeConfig), PluginError>;

    /// Propose future scrapes for a feed, given its recent scrape and post
    /// history. Returning nothing leaves the feed unscheduled until the next
    /// scheduler pass.
    fn propose_schedules(&self, request: &ScheduleRequest, now: DateTime<Utc>)
        -> Vec<ScrapeSchedule>;

    /// Ordered route table.
    fn routes(&self) -> &[Route];
}
