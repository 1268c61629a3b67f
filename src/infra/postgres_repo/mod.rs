//! Postgres-backed `Store`. All cross-process coordination (scrape claims,
//! schedule dedup, post dedup) lives in this backend's SQL.
mod feeds;
mod migrations;
mod models;
mod posts;
mod scrapes;
mod sessions;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::fact::Fact;
use crate::domain::model::{
    Feed, Folder, Post, Scrape, ScrapeConfig, ScrapeCounters, ScrapeSchedule, ScrapeState,
    ScheduleRequest, Session,
};
use crate::ports::store::{Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        migrations::migrate(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn start_scrapes(&self, limit: i64) -> Result<Vec<Scrape>, StoreError> {
        scrapes::start_scrapes(&self.pool, limit).await
    }

    async fn end_scrape(
        &self,
        id: Uuid,
        state: ScrapeState,
        counters: ScrapeCounters,
        errors: &[String],
    ) -> Result<(), StoreError> {
        scrapes::end_scrape(&self.pool, id, state, counters, errors).await
    }

    async fn find_missing_schedules(
        &self,
        limit: i64,
    ) -> Result<Vec<ScheduleRequest>, StoreError> {
        scrapes::find_missing_schedules(&self.pool, limit).await
    }

    async fn insert_schedule(
        &self,
        request: &ScheduleRequest,
        schedules: &[ScrapeSchedule],
    ) -> Result<(), StoreError> {
        scrapes::insert_schedule(&self.pool, request, schedules).await
    }

    async fn list_scrapes(
        &self,
        state: ScrapeState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Scrape>, StoreError> {
        scrapes::list_scrapes(&self.pool, state, limit, offset).await
    }

    async fn write_fact(&self, scrape_id: Uuid, fact: &Fact) -> Result<(), StoreError> {
        posts::write_fact(&self.pool, scrape_id, fact).await
    }

    async fn get_feed_posts(
        &self,
        session_key: &str,
        feed_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        posts::get_feed_posts(&self.pool, session_key, feed_id, limit, offset).await
    }

    async fn get_post(&self, session_key: &str, post_id: Uuid) -> Result<Post, StoreError> {
        posts::get_post(&self.pool, session_key, post_id).await
    }

    async fn mark_read(&self, session_key: &str, post_id: Uuid) -> Result<(), StoreError> {
        posts::mark_read(&self.pool, session_key, post_id).await
    }

    async fn check_if_feed_exists(
        &self,
        session_key: &str,
        folder_id: Option<Uuid>,
        plugin: &str,
        url: &str,
    ) -> Result<Option<Feed>, StoreError> {
        feeds::check_if_feed_exists(&self.pool, session_key, folder_id, plugin, url).await
    }

    async fn add_feed(
        &self,
        session_key: &str,
        folder_id: Option<Uuid>,
        title: &str,
        plugin: &str,
        url: &str,
        initial_config: &ScrapeConfig,
    ) -> Result<Uuid, StoreError> {
        feeds::add_feed(
            &self.pool,
            session_key,
            folder_id,
            title,
            plugin,
            url,
            initial_config,
        )
        .await
    }

    async fn remove_feed(
        &self,
        session_key: &str,
        folder_id: Uuid,
        feed_id: Uuid,
    ) -> Result<(), StoreError> {
        feeds::remove_feed(&self.pool, session_key, folder_id, feed_id).await
    }

    async fn add_folder(&self, session_key: &str, name: &str) -> Result<Uuid, StoreError> {
        feeds::add_folder(&self.pool, session_key, name).await
    }

    async fn get_folders_with_feeds(&self, session_key: &str) -> Result<Vec<Folder>, StoreError> {
        feeds::get_folders_with_feeds(&self.pool, session_key).await
    }

    async fn get_feeds_for_folder(
        &self,
        session_key: &str,
        folder_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Feed>, StoreError> {
        feeds::get_feeds_for_folder(&self.pool, session_key, folder_id, limit, offset).await
    }

    async fn verify_key(&self, key: &str) -> Result<(), StoreError> {
        sessions::verify_key(&self.pool, key).await
    }

    async fn create_or_get_user(&self, email: &str) -> Result<Uuid, StoreError> {
        sessions::create_or_get_user(&self.pool, email).await
    }

    async fn create_login_token(
        &self,
        user_id: Uuid,
        user_agent: &str,
        ip: &str,
    ) -> Result<String, StoreError> {
        sessions::create_login_token(&self.pool, user_id, user_agent, ip).await
    }

    async fn activate_login_token(&self, token: &str) -> Result<Uuid, StoreError> {
        sessions::activate_login_token(&self.pool, token).await
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        user_agent: &str,
        ip: &str,
    ) -> Result<(String, String), StoreError> {
        sessions::create_session(&self.pool, user_id, user_agent, ip).await
    }

    async fn list_sessions(&self, key: &str, page: i64) -> Result<Vec<Session>, StoreError> {
        sessions::list_sessions(&self.pool, key, page).await
    }

    async fn deactivate_session(&self, key: &str) -> Result<(), StoreError> {
        sessions::deactivate_session(&self.pool, key).await
    }
}
