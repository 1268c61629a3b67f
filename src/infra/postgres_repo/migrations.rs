//! Database migrations: create tables, constraints and indexes.
use sqlx::PgPool;
use tracing::info;

use crate::ports::store::StoreError;

pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    info!("DB migrate start");

    let ddls = [
        r#"
      CREATE TABLE IF NOT EXISTS users(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        email TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS sessions(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(id),
        key TEXT NOT NULL UNIQUE,
        user_agent TEXT NOT NULL DEFAULT '',
        ip TEXT NOT NULL DEFAULT '',
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS login_tokens(
        token TEXT PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        user_agent TEXT NOT NULL DEFAULT '',
        ip TEXT NOT NULL DEFAULT '',
        used BOOLEAN NOT NULL DEFAULT FALSE,
        expires_at TIMESTAMPTZ NOT NULL DEFAULT now() + interval '24 hours',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS folders(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(id),
        name TEXT NOT NULL DEFAULT 'default',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS feeds(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        title TEXT NOT NULL,
        plugin TEXT NOT NULL,
        url TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (plugin, url)
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS feed_folders(
        user_id UUID NOT NULL REFERENCES users(id),
        folder_id UUID NOT NULL REFERENCES folders(id),
        feed_id UUID NOT NULL REFERENCES feeds(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, folder_id, feed_id)
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS posts(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        feed_id UUID NOT NULL REFERENCES feeds(id),
        content_hash TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        author TEXT NOT NULL DEFAULT '',
        body BYTEA NOT NULL,
        url TEXT NOT NULL UNIQUE,
        posted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
      )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_posts_content_hash ON posts(content_hash)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_posts_feed_posted ON posts(feed_id, posted_at DESC)"#,
        r#"
      CREATE TABLE IF NOT EXISTS read_statuses(
        user_id UUID NOT NULL REFERENCES users(id),
        post_id UUID NOT NULL REFERENCES posts(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, post_id)
      )"#,
        r#"
      CREATE TABLE IF NOT EXISTS scrapes(
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        feed_id UUID NOT NULL REFERENCES feeds(id),
        plugin TEXT NOT NULL,
        config JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        scheduled_start_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        started_at TIMESTAMPTZ NULL,
        ended_at TIMESTAMPTZ NULL,
        state TEXT NOT NULL DEFAULT 'WAITING'
          CHECK (state IN ('WAITING', 'RUNNING', 'SUCCESS', 'ERRORED')),
        errors TEXT[] NOT NULL DEFAULT '{}',
        total_datums BIGINT NOT NULL DEFAULT 0,
        total_retries BIGINT NOT NULL DEFAULT 0,
        total_tasks BIGINT NOT NULL DEFAULT 0,
        UNIQUE (plugin, scheduled_start_at, config)
      )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_scrapes_feed_state ON scrapes(feed_id, state)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_scrapes_claim ON scrapes(state, scheduled_start_at)"#,
    ];

    for ddl in ddls {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!("DB migrate done");
    Ok(())
}
