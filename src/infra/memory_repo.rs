//! In-memory `Store` backend. One mutex over all tables keeps every
//! operation atomic, which makes it the reference implementation for the
//! store laws the Postgres backend is expected to match. Used by tests and
//! by dev setups that do not want a database.
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::fact::Fact;
use crate::domain::model::{
    Feed, Folder, Post, Scrape, ScrapeConfig, ScrapeCounters, ScrapeSchedule, ScrapeState,
    ScheduleRequest, Session,
};
use crate::infra::compress::{compress_text, decompress_text};
use crate::infra::keys::generate_key;
use crate::ports::store::{Store, StoreError};

struct UserRow {
    id: Uuid,
    email: String,
}

struct SessionRow {
    key: String,
    user_id: Uuid,
    user_agent: String,
    ip: String,
    active: bool,
    created_at: DateTime<Utc>,
}

struct TokenRow {
    token: String,
    user_id: Uuid,
    used: bool,
    expires_at: DateTime<Utc>,
}

struct FolderRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
}

struct FeedRow {
    id: Uuid,
    title: String,
    plugin: String,
    url: String,
}

struct FeedFolderRow {
    user_id: Uuid,
    folder_id: Uuid,
    feed_id: Uuid,
}

struct PostRow {
    id: Uuid,
    feed_id: Uuid,
    content_hash: String,
    title: String,
    author: String,
    body: Vec<u8>,
    url: String,
    posted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: Vec<UserRow>,
    sessions: Vec<SessionRow>,
    login_tokens: Vec<TokenRow>,
    folders: Vec<FolderRow>,
    feeds: Vec<FeedRow>,
    feed_folders: Vec<FeedFolderRow>,
    posts: Vec<PostRow>,
    read_statuses: HashSet<(Uuid, Uuid)>,
    scrapes: Vec<Scrape>,
}

impl Inner {
    fn user_for_key(&self, key: &str) -> Result<Uuid, StoreError> {
        self.sessions
            .iter()
            .find(|s| s.key == key && s.active)
            .map(|s| s.user_id)
            .ok_or(StoreError::InvalidKey)
    }

    fn default_folder(&mut self, user_id: Uuid) -> Uuid {
        if let Some(f) = self
            .folders
            .iter()
            .find(|f| f.user_id == user_id && f.name == "default")
        {
            return f.id;
        }
        let id = Uuid::new_v4();
        self.folders.push(FolderRow {
            id,
            user_id,
            name: "default".to_string(),
        });
        id
    }

    fn link_feed(&mut self, user_id: Uuid, folder_id: Uuid, feed_id: Uuid) {
        let exists = self.feed_folders.iter().any(|l| {
            l.user_id == user_id && l.folder_id == folder_id && l.feed_id == feed_id
        });
        if !exists {
            self.feed_folders.push(FeedFolderRow {
                user_id,
                folder_id,
                feed_id,
            });
        }
    }

    fn feed_summary(&self, id: Uuid) -> Option<Feed> {
        self.feeds.iter().find(|f| f.id == id).map(|f| Feed {
            id: f.id,
            title: f.title.clone(),
            plugin: f.plugin.clone(),
            url: f.url.clone(),
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn start_scrapes(&self, limit: i64) -> Result<Vec<Scrape>, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let mut claimed = Vec::new();
        for scrape in inner.scrapes.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if scrape.state == ScrapeState::Waiting
                && scrape.scheduled_start_at <= now
                && scrape.errors.len() < 3
            {
                scrape.state = ScrapeState::Running;
                scrape.started_at = Some(now);
                claimed.push(scrape.clone());
            }
        }
        Ok(claimed)
    }

    async fn end_scrape(
        &self,
        id: Uuid,
        state: ScrapeState,
        counters: ScrapeCounters,
        errors: &[String],
    ) -> Result<(), StoreError> {
        if !matches!(state, ScrapeState::Success | ScrapeState::Errored) {
            return Err(StoreError::BadTransition(id));
        }
        let mut inner = self.inner.lock().await;
        let scrape = inner
            .scrapes
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound("scrape"))?;
        scrape.state = state;
        scrape.ended_at = Some(Utc::now());
        scrape.total_datums = counters.total_datums;
        scrape.total_retries = counters.total_retries;
        scrape.total_tasks = counters.total_tasks;
        scrape.errors.extend(errors.iter().cloned());
        Ok(())
    }

    async fn find_missing_schedules(
        &self,
        limit: i64,
    ) -> Result<Vec<ScheduleRequest>, StoreError> {
        let inner = self.inner.lock().await;
        let mut requests = Vec::new();
        for feed in &inner.feeds {
            if requests.len() as i64 >= limit {
                break;
            }
            let has_waiting = inner
                .scrapes
                .iter()
                .any(|s| s.feed_id == feed.id && s.state == ScrapeState::Waiting);
            if has_waiting {
                continue;
            }

            let mut latest_scrapes: Vec<Scrape> = inner
                .scrapes
                .iter()
                .filter(|s| s.feed_id == feed.id)
                .cloned()
                .collect();
            latest_scrapes.sort_by(|a, b| b.scheduled_start_at.cmp(&a.scheduled_start_at));
            latest_scrapes.truncate(10);

            let mut latest_posts: Vec<&PostRow> = inner
                .posts
                .iter()
                .filter(|p| p.feed_id == feed.id)
                .collect();
            latest_posts.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
            let latest_posts = latest_posts
                .into_iter()
                .take(10)
                .map(|p| Post {
                    id: p.id,
                    title: p.title.clone(),
                    author: p.author.clone(),
                    body: None,
                    url: p.url.clone(),
                    posted_at: p.posted_at,
                    read: false,
                })
                .collect();

            requests.push(ScheduleRequest {
                feed_id: feed.id,
                plugin: feed.plugin.clone(),
                latest_scrapes,
                latest_posts,
            });
        }
        Ok(requests)
    }

    async fn insert_schedule(
        &self,
        request: &ScheduleRequest,
        schedules: &[ScrapeSchedule],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        for schedule in schedules {
            let duplicate = inner.scrapes.iter().any(|s| {
                s.plugin == request.plugin
                    && s.scheduled_start_at == schedule.scheduled_start_at
                    && s.config == schedule.config
            });
            if duplicate {
                continue;
            }
            inner.scrapes.push(Scrape {
                id: Uuid::new_v4(),
                feed_id: request.feed_id,
                plugin: request.plugin.clone(),
                config: schedule.config.clone(),
                created_at: now,
                scheduled_start_at: schedule.scheduled_start_at,
                started_at: None,
                ended_at: None,
                state: ScrapeState::Waiting,
                errors: Vec::new(),
                total_datums: 0,
                total_retries: 0,
                total_tasks: 0,
            });
        }
        Ok(())
    }

    async fn list_scrapes(
        &self,
        state: ScrapeState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Scrape>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .scrapes
            .iter()
            .filter(|s| s.state == state)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn write_fact(&self, scrape_id: Uuid, fact: &Fact) -> Result<(), StoreError> {
        let Fact::Post(draft) = fact;

        let content_hash = draft.content_hash();
        let body = compress_text(&draft.body)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        if inner.posts.iter().any(|p| p.content_hash == content_hash) {
            return Ok(());
        }

        let feed_id = inner
            .scrapes
            .iter()
            .find(|s| s.id == scrape_id)
            .map(|s| s.feed_id)
            .ok_or(StoreError::NotFound("scrape"))?;

        if let Some(existing) = inner.posts.iter_mut().find(|p| p.url == draft.url) {
            existing.title = draft.title.clone();
            existing.author = draft.author.clone();
            existing.body = body;
            existing.content_hash = content_hash;
            return Ok(());
        }

        inner.posts.push(PostRow {
            id: Uuid::new_v4(),
            feed_id,
            content_hash,
            title: draft.title.clone(),
            author: draft.author.clone(),
            body,
            url: draft.url.clone(),
            posted_at: draft.posted_at,
        });
        Ok(())
    }

    async fn get_feed_posts(
        &self,
        session_key: &str,
        feed_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;

        let mut rows: Vec<&PostRow> = inner
            .posts
            .iter()
            .filter(|p| p.feed_id == feed_id)
            .collect();
        rows.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|p| Post {
                id: p.id,
                title: p.title.clone(),
                author: p.author.clone(),
                body: None,
                url: p.url.clone(),
                posted_at: p.posted_at,
                read: inner.read_statuses.contains(&(user_id, p.id)),
            })
            .collect())
    }

    async fn get_post(&self, session_key: &str, post_id: Uuid) -> Result<Post, StoreError> {
        let (post, body) = {
            let inner = self.inner.lock().await;
            let user_id = inner.user_for_key(session_key)?;
            let row = inner
                .posts
                .iter()
                .find(|p| p.id == post_id)
                .ok_or(StoreError::NotFound("post"))?;
            (
                Post {
                    id: row.id,
                    title: row.title.clone(),
                    author: row.author.clone(),
                    body: None,
                    url: row.url.clone(),
                    posted_at: row.posted_at,
                    read: inner.read_statuses.contains(&(user_id, row.id)),
                },
                row.body.clone(),
            )
        };
        let text = decompress_text(&body)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(Post {
            body: Some(text),
            ..post
        })
    }

    async fn mark_read(&self, session_key: &str, post_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;
        inner.read_statuses.insert((user_id, post_id));
        Ok(())
    }

    async fn check_if_feed_exists(
        &self,
        session_key: &str,
        folder_id: Option<Uuid>,
        plugin: &str,
        url: &str,
    ) -> Result<Option<Feed>, StoreError> {
        let mut inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;

        let Some(feed_id) = inner
            .feeds
            .iter()
            .find(|f| f.url == url && f.plugin == plugin)
            .map(|f| f.id)
        else {
            return Ok(None);
        };

        let folder_id = match folder_id {
            Some(id) => id,
            None => inner.default_folder(user_id),
        };
        inner.link_feed(user_id, folder_id, feed_id);
        Ok(inner.feed_summary(feed_id))
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
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;

        let folder_id = match folder_id {
            Some(id) => id,
            None => inner.default_folder(user_id),
        };

        let feed_id = Uuid::new_v4();
        inner.feeds.push(FeedRow {
            id: feed_id,
            title: title.to_string(),
            plugin: plugin.to_string(),
            url: url.to_string(),
        });
        inner.link_feed(user_id, folder_id, feed_id);
        inner.scrapes.push(Scrape {
            id: Uuid::new_v4(),
            feed_id,
            plugin: plugin.to_string(),
            config: initial_config.clone(),
            created_at: now,
            scheduled_start_at: now,
            started_at: None,
            ended_at: None,
            state: ScrapeState::Waiting,
            errors: Vec::new(),
            total_datums: 0,
            total_retries: 0,
            total_tasks: 0,
        });
        Ok(feed_id)
    }

    async fn remove_feed(
        &self,
        session_key: &str,
        folder_id: Uuid,
        feed_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;
        inner.feed_folders.retain(|l| {
            !(l.user_id == user_id && l.folder_id == folder_id && l.feed_id == feed_id)
        });
        Ok(())
    }

    async fn add_folder(&self, session_key: &str, name: &str) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;
        let id = Uuid::new_v4();
        inner.folders.push(FolderRow {
            id,
            user_id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn get_folders_with_feeds(&self, session_key: &str) -> Result<Vec<Folder>, StoreError> {
        let inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;

        let mut folders: Vec<&FolderRow> = inner
            .folders
            .iter()
            .filter(|f| f.user_id == user_id)
            .collect();
        folders.sort_by(|a, b| b.name.cmp(&a.name));

        Ok(folders
            .into_iter()
            .map(|folder| {
                let feeds = inner
                    .feed_folders
                    .iter()
                    .filter(|l| l.user_id == user_id && l.folder_id == folder.id)
                    .filter_map(|l| inner.feed_summary(l.feed_id))
                    .collect();
                Folder {
                    id: folder.id,
                    title: folder.name.clone(),
                    feeds,
                }
            })
            .collect())
    }

    async fn get_feeds_for_folder(
        &self,
        session_key: &str,
        folder_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Feed>, StoreError> {
        let inner = self.inner.lock().await;
        let user_id = inner.user_for_key(session_key)?;
        Ok(inner
            .feed_folders
            .iter()
            .filter(|l| l.user_id == user_id && l.folder_id == folder_id)
            .filter_map(|l| inner.feed_summary(l.feed_id))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn verify_key(&self, key: &str) -> Result<(), StoreError> {
        let inner = self.inner.lock().await;
        inner.user_for_key(key).map(|_| ())
    }

    async fn create_or_get_user(&self, email: &str) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(u) = inner.users.iter().find(|u| u.email == email) {
            return Ok(u.id);
        }
        let id = Uuid::new_v4();
        inner.users.push(UserRow {
            id,
            email: email.to_string(),
        });
        Ok(id)
    }

    async fn create_login_token(
        &self,
        user_id: Uuid,
        _user_agent: &str,
        _ip: &str,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().await;
        let token = generate_key();
        inner.login_tokens.push(TokenRow {
            token: token.clone(),
            user_id,
            used: false,
            expires_at: Utc::now() + Duration::hours(24),
        });
        Ok(token)
    }

    async fn activate_login_token(&self, token: &str) -> Result<Uuid, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let row = inner
            .login_tokens
            .iter_mut()
            .find(|t| t.token == token && !t.used && t.expires_at > now)
            .ok_or(StoreError::InvalidToken)?;
        row.used = true;
        Ok(row.user_id)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        user_agent: &str,
        ip: &str,
    ) -> Result<(String, String), StoreError> {
        let mut inner = self.inner.lock().await;
        let email = inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.email.clone())
            .ok_or(StoreError::NotFound("user"))?;
        let key = generate_key();
        inner.sessions.push(SessionRow {
            key: key.clone(),
            user_id,
            user_agent: user_agent.to_string(),
            ip: ip.to_string(),
            active: true,
            created_at: Utc::now(),
        });
        Ok((email, key))
    }

    async fn list_sessions(&self, key: &str, page: i64) -> Result<Vec<Session>, StoreError> {
        let inner = self.inner.lock().await;
        let user_id = inner.user_for_key(key)?;
        Ok(inner
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .skip((page.max(0) * 25) as usize)
            .take(25)
            .map(|s| Session {
                created_at: s.created_at,
                user_agent: s.user_agent.clone(),
                ip: s.ip.clone(),
                active: s.active,
            })
            .collect())
    }

    async fn deactivate_session(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.sessions.iter_mut().find(|s| s.key == key) {
            s.active = false;
        }
        Ok(())
    }
}
