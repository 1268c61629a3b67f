//! Row records bridging sqlx and the domain types.
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::model::{Feed, Post, Scrape, ScrapeState, Session};
use crate::ports::store::StoreError;

#[derive(Debug, sqlx::FromRow)]
pub struct ScrapeRecord {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub plugin: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub scheduled_start_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: String,
    pub errors: Vec<String>,
    pub total_datums: i64,
    pub total_retries: i64,
    pub total_tasks: i64,
}

impl TryFrom<ScrapeRecord> for Scrape {
    type Error = StoreError;

    fn try_from(r: ScrapeRecord) -> Result<Self, StoreError> {
        let state = ScrapeState::parse(&r.state)
            .ok_or_else(|| StoreError::Internal(format!("unknown scrape state {:?}", r.state)))?;
        let config = serde_json::from_value(r.config)
            .map_err(|e| StoreError::Internal(format!("bad scrape config: {e}")))?;
        Ok(Scrape {
            id: r.id,
            feed_id: r.feed_id,
            plugin: r.plugin,
            config,
            created_at: r.created_at,
            scheduled_start_at: r.scheduled_start_at,
            started_at: r.started_at,
            ended_at: r.ended_at,
            state,
            errors: r.errors,
            total_datums: r.total_datums,
            total_retries: r.total_retries,
            total_tasks: r.total_tasks,
        })
    }
}

/// Columns shared by every scrape read.
pub const SCRAPE_COLUMNS: &str = "id, feed_id, plugin, config, created_at, scheduled_start_at, \
     started_at, ended_at, state, errors, total_datums, total_retries, total_tasks";

#[derive(Debug, sqlx::FromRow)]
pub struct PostSummaryRecord {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub url: String,
    pub posted_at: DateTime<Utc>,
    pub read: bool,
}

impl From<PostSummaryRecord> for Post {
    fn from(r: PostSummaryRecord) -> Self {
        Post {
            id: r.id,
            title: r.title,
            author: r.author,
            body: None,
            url: r.url,
            posted_at: r.posted_at,
            read: r.read,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FeedRecord {
    pub id: Uuid,
    pub title: String,
    pub plugin: String,
    pub url: String,
}

impl From<FeedRecord> for Feed {
    fn from(r: FeedRecord) -> Self {
        Feed {
            id: r.id,
            title: r.title,
            plugin: r.plugin,
            url: r.url,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRecord {
    pub created_at: DateTime<Utc>,
    pub user_agent: String,
    pub ip: String,
    pub active: bool,
}

impl From<SessionRecord> for Session {
    fn from(r: SessionRecord) -> Self {
        Session {
            created_at: r.created_at,
            user_agent: r.user_agent,
            ip: r.ip,
            active: r.active,
        }
    }
}
