//! The fact write path and post reads. Writes dedup by content hash in one
//! transaction; a matching hash means the exact content is already stored
//! and the write is a no-op. A url collision instead refreshes the stored
//! post in place.
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::fact::Fact;
use crate::domain::model::Post;
use crate::infra::compress::{compress_text, decompress_text};
use crate::ports::store::StoreError;

use super::models::PostSummaryRecord;
use super::sessions::user_id_for_key;

pub async fn write_fact(pool: &PgPool, scrape_id: Uuid, fact: &Fact) -> Result<(), StoreError> {
    let Fact::Post(draft) = fact;

    let content_hash = draft.content_hash();
    let body = compress_text(&draft.body)
        .await
        .map_err(|e| StoreError::Internal(format!("compress failed: {e}")))?;

    let mut tx = pool.begin().await?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT content_hash FROM posts WHERE content_hash = $1")
            .bind(&content_hash)
            .fetch_optional(&mut *tx)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    sqlx::query(
        r#"
      INSERT INTO posts
      (feed_id, content_hash, title, author, body, url, posted_at)
      VALUES
      ((SELECT feed_id FROM scrapes WHERE id = $1), $2, $3, $4, $5, $6, $7)
      ON CONFLICT (url) DO UPDATE SET
        title = EXCLUDED.title,
        author = EXCLUDED.author,
        body = EXCLUDED.body,
        content_hash = EXCLUDED.content_hash
      "#,
    )
    .bind(scrape_id)
    .bind(&content_hash)
    .bind(&draft.title)
    .bind(&draft.author)
    .bind(&body)
    .bind(&draft.url)
    .bind(draft.posted_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_feed_posts(
    pool: &PgPool,
    session_key: &str,
    feed_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    let records: Vec<PostSummaryRecord> = sqlx::query_as(
        r#"
      SELECT po.id, po.title, po.author, po.url, po.posted_at,
        EXISTS(
          SELECT 1 FROM read_statuses
          WHERE post_id = po.id AND user_id = $1
        ) AS read
      FROM posts po
      WHERE po.feed_id = $2
      ORDER BY po.posted_at DESC
      LIMIT $3 OFFSET $4
      "#,
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(records.into_iter().map(Into::into).collect())
}

pub async fn get_post(pool: &PgPool, session_key: &str, post_id: Uuid) -> Result<Post, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        title: String,
        author: String,
        body: Vec<u8>,
        url: String,
        posted_at: chrono::DateTime<chrono::Utc>,
        read: bool,
    }

    let row: Row = sqlx::query_as(
        r#"
      SELECT po.id, po.title, po.author, po.body, po.url, po.posted_at,
        EXISTS(
          SELECT 1 FROM read_statuses
          WHERE post_id = po.id AND user_id = $1
        ) AS read
      FROM posts po
      WHERE po.id = $2
      "#,
    )
    .bind(user_id)
    .bind(post_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound("post"))?;

    let body = decompress_text(&row.body)
        .await
        .map_err(|e| StoreError::Internal(format!("decompress failed: {e}")))?;

    Ok(Post {
        id: row.id,
        title: row.title,
        author: row.author,
        body: Some(body),
        url: row.url,
        posted_at: row.posted_at,
        read: row.read,
    })
}

pub async fn mark_read(pool: &PgPool, session_key: &str, post_id: Uuid) -> Result<(), StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    sqlx::query(
        r#"
      INSERT INTO read_statuses
      (user_id, post_id)
      VALUES ($1, $2)
      ON CONFLICT DO NOTHING
      "#,
    )
    .bind(user_id)
    .bind(post_id)
    .execute(pool)
    .await?;

    Ok(())
}
