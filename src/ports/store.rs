//! The store contract. Everything durable flows through this trait; the
//! orchestrator, scheduler and API never talk to a database directly.
use thiserror::Error;
use uuid::Uuid;

use crate::domain::fact::Fact;
use crate::domain::model::{
    Feed, Folder, Post, Scrape, ScrapeConfig, ScrapeCounters, ScrapeSchedule, ScrapeState,
    ScheduleRequest, Session,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to write unsupported fact kind")]
    UnsupportedFact,
    #[error("invalid or inactive session key")]
    InvalidKey,
    #[error("login token invalid")]
    InvalidToken,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("could not end scrape {0}")]
    BadTransition(Uuid),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

/// Durable state operations the core depends on.
///
/// `start_scrapes` is the claim point: it must atomically move up to `limit`
/// ready rows (`WAITING`, due, fewer than three recorded errors) to `RUNNING`
/// and never hand the same row to two concurrent callers.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // scrape lifecycle
    async fn start_scrapes(&self, limit: i64) -> Result<Vec<Scrape>, StoreError>;
    async fn end_scrape(
        &self,
        id: Uuid,
        state: ScrapeState,
        counters: ScrapeCounters,
        errors: &[String],
    ) -> Result<(), StoreError>;
    async fn find_missing_schedules(&self, limit: i64)
        -> Result<Vec<ScheduleRequest>, StoreError>;
    async fn insert_schedule(
        &self,
        request: &ScheduleRequest,
        schedules: &[ScrapeSchedule],
    ) -> Result<(), StoreError>;
    async fn list_scrapes(
        &self,
        state: ScrapeState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Scrape>, StoreError>;

    // facts & feeds
    async fn write_fact(&self, scrape_id: Uuid, fact: &Fact) -> Result<(), StoreError>;
    async fn get_feed_posts(
        &self,
        session_key: &str,
        feed_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError>;
    async fn get_post(&self, session_key: &str, post_id: Uuid) -> Result<Post, StoreError>;
    async fn mark_read(&self, session_key: &str, post_id: Uuid) -> Result<(), StoreError>;
    async fn check_if_feed_exists(
        &self,
        session_key: &str,
        folder_id: Option<Uuid>,
        plugin: &str,
        url: &str,
    ) -> Result<Option<Feed>, StoreError>;
    async fn add_feed(
        &self,
        session_key: &str,
        folder_id: Option<Uuid>,
        title: &str,
        plugin: &str,
        url: &str,
        initial_config: &ScrapeConfig,
    ) -> Result<Uuid, StoreError>;
    async fn remove_feed(
        &self,
        session_key: &str,
        folder_id: Uuid,
        feed_id: Uuid,
    ) -> Result<(), StoreError>;
    async fn add_folder(&self, session_key: &str, name: &str) -> Result<Uuid, StoreError>;
    async fn get_folders_with_feeds(&self, session_key: &str) -> Result<Vec<Folder>, StoreError>;
    async fn get_feeds_for_folder(
        &self,
        session_key: &str,
        folder_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Feed>, StoreError>;

    // users & sessions
    async fn verify_key(&self, key: &str) -> Result<(), StoreError>;
    async fn create_or_get_user(&self, email: &str) -> Result<Uuid, StoreError>;
    async fn create_login_token(
        &self,
        user_id: Uuid,
        user_agent: &str,
        ip: &str,
    ) -> Result<String, StoreError>;
    async fn activate_login_token(&self, token: &str) -> Result<Uuid, StoreError>;
    async fn create_session(
        &self,
        user_id: Uuid,
        user_agent: &str,
        ip: &str,
    ) -> Result<(String, String), StoreError>;
    async fn list_sessions(&self, key: &str, page: i64) -> Result<Vec<Session>, StoreError>;
    async fn deactivate_session(&self, key: &str) -> Result<(), StoreError>;
}
