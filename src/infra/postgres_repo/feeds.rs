//! Feed and folder membership. Feed creation is transactional: the feed row,
//! its folder link, and the initial WAITING scrape land together or not at
//! all.
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::model::{Feed, Folder, ScrapeConfig};
use crate::ports::store::StoreError;

use super::models::FeedRecord;
use super::sessions::user_id_for_key;

async fn resolve_folder(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    folder_id: Option<Uuid>,
) -> Result<Uuid, StoreError> {
    if let Some(id) = folder_id {
        return Ok(id);
    }

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM folders WHERE user_id = $1 AND name = 'default'")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = sqlx::query_scalar(
        r#"
      INSERT INTO folders
      (user_id)
      VALUES ($1)
      RETURNING id
      "#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

pub async fn add_feed(
    pool: &PgPool,
    session_key: &str,
    folder_id: Option<Uuid>,
    title: &str,
    plugin: &str,
    url: &str,
    initial_config: &ScrapeConfig,
) -> Result<Uuid, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;
    let config = serde_json::to_value(initial_config)
        .map_err(|e| StoreError::Internal(format!("unencodable config: {e}")))?;

    let mut tx = pool.begin().await?;
    let folder_id = resolve_folder(&mut tx, user_id, folder_id).await?;

    let feed_id: Uuid = sqlx::query_scalar(
        r#"
      INSERT INTO feeds
      (title, plugin, url)
      VALUES ($1, $2, $3)
      ON CONFLICT (plugin, url) DO UPDATE SET title = EXCLUDED.title
      RETURNING id
      "#,
    )
    .bind(title)
    .bind(plugin)
    .bind(url)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
      INSERT INTO feed_folders
      (user_id, folder_id, feed_id)
      VALUES ($1, $2, $3)
      ON CONFLICT DO NOTHING
      "#,
    )
    .bind(user_id)
    .bind(folder_id)
    .bind(feed_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
      INSERT INTO scrapes
      (feed_id, plugin, config)
      VALUES ($1, $2, $3)
      "#,
    )
    .bind(feed_id)
    .bind(plugin)
    .bind(config)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(feed_id)
}

/// Looks a feed up by `(plugin, url)`; when it already exists, links it into
/// the caller's folder instead of creating a duplicate.
pub async fn check_if_feed_exists(
    pool: &PgPool,
    session_key: &str,
    folder_id: Option<Uuid>,
    plugin: &str,
    url: &str,
) -> Result<Option<Feed>, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    let record: Option<FeedRecord> =
        sqlx::query_as("SELECT id, title, plugin, url FROM feeds WHERE url = $1 AND plugin = $2")
            .bind(url)
            .bind(plugin)
            .fetch_optional(pool)
            .await?;
    let Some(record) = record else {
        return Ok(None);
    };

    let mut tx = pool.begin().await?;
    let folder_id = resolve_folder(&mut tx, user_id, folder_id).await?;
    sqlx::query(
        r#"
      INSERT INTO feed_folders
      (user_id, folder_id, feed_id)
      VALUES ($1, $2, $3)
      ON CONFLICT DO NOTHING
      "#,
    )
    .bind(user_id)
    .bind(folder_id)
    .bind(record.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Some(record.into()))
}

pub async fn remove_feed(
    pool: &PgPool,
    session_key: &str,
    folder_id: Uuid,
    feed_id: Uuid,
) -> Result<(), StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    sqlx::query(
        r#"
      DELETE FROM feed_folders
      WHERE user_id = $1
      AND folder_id = $2
      AND feed_id = $3
      "#,
    )
    .bind(user_id)
    .bind(folder_id)
    .bind(feed_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn add_folder(pool: &PgPool, session_key: &str, name: &str) -> Result<Uuid, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    let id = sqlx::query_scalar(
        r#"
      INSERT INTO folders
      (user_id, name)
      VALUES ($1, $2)
      RETURNING id
      "#,
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_folders_with_feeds(
    pool: &PgPool,
    session_key: &str,
) -> Result<Vec<Folder>, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    #[derive(sqlx::FromRow)]
    struct Row {
        folder_id: Uuid,
        folder_name: String,
        feed_id: Option<Uuid>,
        feed_title: Option<String>,
        feed_plugin: Option<String>,
        feed_url: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
      SELECT fo.id AS folder_id, fo.name AS folder_name,
             f.id AS feed_id, f.title AS feed_title,
             f.plugin AS feed_plugin, f.url AS feed_url
      FROM folders fo
      LEFT JOIN feed_folders ff ON (ff.user_id = fo.user_id AND ff.folder_id = fo.id)
      LEFT JOIN feeds f ON (f.id = ff.feed_id)
      WHERE fo.user_id = $1
      ORDER BY fo.name DESC, f.title
      "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut folders: Vec<Folder> = Vec::new();
    for row in rows {
        if folders.last().map(|f| f.id) != Some(row.folder_id) {
            folders.push(Folder {
                id: row.folder_id,
                title: row.folder_name,
                feeds: Vec::new(),
            });
        }
        if let (Some(id), Some(title), Some(plugin), Some(url)) =
            (row.feed_id, row.feed_title, row.feed_plugin, row.feed_url)
        {
            if let Some(folder) = folders.last_mut() {
                folder.feeds.push(Feed {
                    id,
                    title,
                    plugin,
                    url,
                });
            }
        }
    }

    Ok(folders)
}

pub async fn get_feeds_for_folder(
    pool: &PgPool,
    session_key: &str,
    folder_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Feed>, StoreError> {
    let user_id = user_id_for_key(pool, session_key).await?;

    let records: Vec<FeedRecord> = sqlx::query_as(
        r#"
      SELECT f.id, f.title, f.plugin, f.url
      FROM feeds f
      JOIN feed_folders ff ON (ff.feed_id = f.id)
      WHERE ff.user_id = $1
      AND ff.folder_id = $2
      ORDER BY f.title
      LIMIT $3 OFFSET $4
      "#,
    )
    .bind(user_id)
    .bind(folder_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(records.into_iter().map(Into::into).collect())
}
