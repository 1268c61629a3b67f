//! Core entities: feeds, folders, posts, scrapes and their lifecycle state.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::hashing::sha256_hex;

/// Lifecycle of a scheduled scrape. The only legal transitions are
/// `Waiting -> Running -> Success | Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeState {
    Waiting,
    Running,
    Success,
    Errored,
}

impl ScrapeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeState::Waiting => "WAITING",
            ScrapeState::Running => "RUNNING",
            ScrapeState::Success => "SUCCESS",
            ScrapeState::Errored => "ERRORED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(ScrapeState::Waiting),
            "RUNNING" => Some(ScrapeState::Running),
            "SUCCESS" => Some(ScrapeState::Success),
            "ERRORED" => Some(ScrapeState::Errored),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin-owned scrape configuration. The orchestrator only ever looks at
/// `entrypoints`; everything under `extra` belongs to the plugin that wrote
/// it. Persisted as structured data with a schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub entrypoints: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

fn default_config_version() -> u32 {
    1
}

impl ScrapeConfig {
    pub fn from_entrypoints(entrypoints: Vec<String>) -> Self {
        Self {
            version: default_config_version(),
            entrypoints,
            extra: serde_json::Value::Null,
        }
    }
}

/// How a task failure should be treated by the scrape runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retryable: network I/O, timeouts, 5xx, parse failures.
    Transient,
    /// Recorded and dropped: 4xx (except 429), unroutable URLs, contract
    /// violations.
    Permanent,
    /// Requeued without consuming the retry budget.
    RateLimited,
    /// Fatal to the whole scrape.
    Cancelled,
}

/// Counters accumulated over one scrape run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeCounters {
    /// Tasks handed to a handler, counting retried attempts again.
    pub total_tasks: i64,
    /// Facts durably written through the store.
    pub total_datums: i64,
    /// Tasks put back on the queue after a failed or rate-limited attempt.
    pub total_retries: i64,
}

/// One scheduled execution of a plugin against a feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrape {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub plugin: String,
    pub config: ScrapeConfig,
    pub created_at: DateTime<Utc>,
    pub scheduled_start_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: ScrapeState,
    pub errors: Vec<String>,
    pub total_datums: i64,
    pub total_retries: i64,
    pub total_tasks: i64,
}

/// A post as emitted by a plugin handler, before it has an identity in the
/// store. Identity is the content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub author: String,
    pub body: String,
    pub url: String,
    pub posted_at: DateTime<Utc>,
}

impl PostDraft {
    /// Stable digest over the normalized content, used for dedup. Fields are
    /// joined with a separator so moving bytes between fields changes the
    /// hash.
    pub fn content_hash(&self) -> String {
        let joined = format!("{}|{}|{}|{}", self.title, self.author, self.body, self.url);
        sha256_hex(joined.as_bytes())
    }
}

/// A stored post as served to readers. `body` is only populated on the
/// single-post read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub url: String,
    pub posted_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub title: String,
    pub plugin: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub title: String,
    pub feeds: Vec<Feed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub created_at: DateTime<Utc>,
    pub user_agent: String,
    pub ip: String,
    pub active: bool,
}

/// Everything a plugin gets to see when deciding whether (and how) a feed
/// should be scraped again.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub feed_id: Uuid,
    pub plugin: String,
    pub latest_scrapes: Vec<Scrape>,
    pub latest_posts: Vec<Post>,
}

/// A plugin's proposal for a future scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeSchedule {
    pub scheduled_start_at: DateTime<Utc>,
    pub config: ScrapeConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PostDraft {
        PostDraft {
            title: "A".to_string(),
            author: "b".to_string(),
            body: "x".to_string(),
            url: "https://example.com/1".to_string(),
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn content_hash_ignores_posted_at() {
        let mut a = draft();
        let b = draft();
        a.posted_at = a.posted_at + chrono::Duration::days(1);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_is_field_separated() {
        let mut a = draft();
        let mut b = draft();
        a.title = "Ab".to_string();
        a.author = "c".to_string();
        b.title = "A".to_string();
        b.author = "bc".to_string();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for s in [
            ScrapeState::Waiting,
            ScrapeState::Running,
            ScrapeState::Success,
            ScrapeState::Errored,
        ] {
            assert_eq!(ScrapeState::parse(s.as_str()), Some(s));
        }
        assert_eq!(ScrapeState::parse("DONE"), None);
    }

    #[test]
    fn config_defaults_apply_when_fields_missing() {
        let cfg: ScrapeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.version, 1);
        assert!(cfg.entrypoints.is_empty());
        assert!(cfg.extra.is_null());
    }
}
