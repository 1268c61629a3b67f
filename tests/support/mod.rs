#![allow(dead_code)]
//! Shared fixtures: a scripted plugin, a stub fetcher, and store seeding
//! helpers.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use hydrocarbon::app::plugin::{HandlerOpts, Plugin, PluginError, Route};
use hydrocarbon::app::registry::PluginRegistry;
use hydrocarbon::app::runner::ScrapeRunner;
use hydrocarbon::domain::fact::Fact;
use hydrocarbon::domain::model::{
    PostDraft, Scrape, ScrapeConfig, ScrapeSchedule, ScheduleRequest,
};
use hydrocarbon::infra::memory_repo::MemoryStore;
use hydrocarbon::ports::http::{FetchError, FetchedPage, Fetcher};
use hydrocarbon::ports::store::Store;

/// Handlers in these tests script their own behavior, so outbound HTTP is a
/// stub that always succeeds with an empty body.
pub struct StubFetcher;

#[async_trait::async_trait]
impl Fetcher for StubFetcher {
    async fn get(
        &self,
        _url: &str,
        _cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        Ok(FetchedPage {
            status: 200,
            body: Vec::new(),
        })
    }
}

pub struct TestPlugin {
    name: &'static str,
    accepts: &'static str,
    routes: Vec<Route>,
    schedule_at: Option<DateTime<Utc>>,
}

impl TestPlugin {
    pub fn new(name: &'static str, accepts: &'static str, routes: Vec<Route>) -> Self {
        Self {
            name,
            accepts,
            routes,
            schedule_at: None,
        }
    }

    /// Makes the plugin propose exactly one scrape at a fixed time,
    /// regardless of history. A fixed proposal makes schedule insertion
    /// observably idempotent.
    pub fn with_schedule_at(mut self, at: DateTime<Utc>) -> Self {
        self.schedule_at = Some(at);
        self
    }
}

#[async_trait::async_trait]
impl Plugin for TestPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn validate_config(&self, config: &ScrapeConfig) -> Result<(), PluginError> {
        for e in &config.entrypoints {
            if !e.contains(self.accepts) {
                return Err(PluginError::InvalidConfig(format!(
                    "{} does not handle {e}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    async fn create_config(
        &self,
        url: &str,
        _opts: &HandlerOpts,
    ) -> Result<(String, ScrapeConfig), PluginError> {
        Ok((
            format!("feed at {url}"),
            ScrapeConfig::from_entrypoints(vec![url.to_string()]),
        ))
    }

    fn propose_schedules(
        &self,
        _request: &ScheduleRequest,
        _now: DateTime<Utc>,
    ) -> Vec<ScrapeSchedule> {
        match self.schedule_at {
            Some(at) => vec![ScrapeSchedule {
                scheduled_start_at: at,
                config: ScrapeConfig::from_entrypoints(vec![format!(
                    "https://{}/1",
                    self.accepts
                )]),
            }],
            None => Vec::new(),
        }
    }

    fn routes(&self) -> &[Route] {
        &self.routes
    }
}

pub fn post_fact(title: &str, body: &str, url: &str) -> Fact {
    Fact::Post(PostDraft {
        title: title.to_string(),
        author: "author".to_string(),
        body: body.to_string(),
        url: url.to_string(),
        posted_at: Utc::now(),
    })
}

pub fn registry(plugins: Vec<Arc<dyn Plugin>>) -> Arc<PluginRegistry> {
    Arc::new(PluginRegistry::new(plugins).expect("registry"))
}

pub fn runner(plugins: Vec<Arc<dyn Plugin>>, store: Arc<MemoryStore>) -> ScrapeRunner {
    ScrapeRunner::new(registry(plugins), store, Arc::new(StubFetcher))
}

/// A user with an active session.
pub async fn session_key(store: &MemoryStore) -> String {
    let user_id = store
        .create_or_get_user("reader@example.com")
        .await
        .expect("user");
    let (_, key) = store
        .create_session(user_id, "tests", "127.0.0.1")
        .await
        .expect("session");
    key
}

/// Subscribes a feed (which schedules its first scrape) and claims that
/// scrape, leaving it RUNNING.
pub async fn claim_one(store: &MemoryStore, key: &str, plugin: &str, url: &str) -> Scrape {
    store
        .add_feed(
            key,
            None,
            "test feed",
            plugin,
            url,
            &ScrapeConfig::from_entrypoints(vec![url.to_string()]),
        )
        .await
        .expect("add feed");
    let mut claimed = store.start_scrapes(1).await.expect("claim");
    assert_eq!(claimed.len(), 1, "expected one claimable scrape");
    claimed.pop().expect("scrape")
}
