//! Scrape lifecycle SQL: the skip-locked claim, terminal transitions, and
//! the scheduler's missing-schedule scan.
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::model::{
    Scrape, ScrapeCounters, ScrapeSchedule, ScrapeState, ScheduleRequest,
};
use crate::ports::store::StoreError;

use super::models::{PostSummaryRecord, ScrapeRecord, SCRAPE_COLUMNS};

/// Claims up to `limit` ready scrapes. `FOR UPDATE SKIP LOCKED` keeps
/// concurrent worker pools from contending on (or double-claiming) the same
/// rows.
pub async fn start_scrapes(pool: &PgPool, limit: i64) -> Result<Vec<Scrape>, StoreError> {
    let mut tx = pool.begin().await?;

    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
      SELECT id
      FROM scrapes
      WHERE scheduled_start_at <= now()
      AND state = 'WAITING'
      AND cardinality(errors) < 3
      LIMIT $1
      FOR UPDATE SKIP LOCKED
      "#,
    )
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<ScrapeRecord> = sqlx::query_as(&format!(
        r#"
      UPDATE scrapes
      SET state = 'RUNNING', started_at = now()
      WHERE id = ANY($1)
      RETURNING {SCRAPE_COLUMNS}
      "#
    ))
    .bind(&ids)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    records.into_iter().map(Scrape::try_from).collect()
}

pub async fn end_scrape(
    pool: &PgPool,
    id: Uuid,
    state: ScrapeState,
    counters: ScrapeCounters,
    errors: &[String],
) -> Result<(), StoreError> {
    if !matches!(state, ScrapeState::Success | ScrapeState::Errored) {
        return Err(StoreError::BadTransition(id));
    }

    let final_state: Option<String> = sqlx::query_scalar(
        r#"
      UPDATE scrapes
      SET state = $2, ended_at = now(),
          total_datums = $3, total_retries = $4, total_tasks = $5,
          errors = errors || $6
      WHERE id = $1 AND state = 'RUNNING'
      RETURNING state
      "#,
    )
    .bind(id)
    .bind(state.as_str())
    .bind(counters.total_datums)
    .bind(counters.total_retries)
    .bind(counters.total_tasks)
    .bind(errors.to_vec())
    .fetch_optional(pool)
    .await?;

    match final_state {
        Some(s) if s == state.as_str() => Ok(()),
        _ => Err(StoreError::BadTransition(id)),
    }
}

pub async fn list_scrapes(
    pool: &PgPool,
    state: ScrapeState,
    limit: i64,
    offset: i64,
) -> Result<Vec<Scrape>, StoreError> {
    let records: Vec<ScrapeRecord> = sqlx::query_as(&format!(
        r#"
      SELECT {SCRAPE_COLUMNS}
      FROM scrapes
      WHERE state = $1
      ORDER BY scheduled_start_at DESC
      LIMIT $2 OFFSET $3
      "#
    ))
    .bind(state.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    records.into_iter().map(Scrape::try_from).collect()
}

/// Feeds with no pending scrape, each bundled with its recent scrape and
/// post history so the feed's plugin can decide what comes next. Feeds that
/// have never produced a post still show up.
pub async fn find_missing_schedules(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ScheduleRequest>, StoreError> {
    let feeds: Vec<(Uuid, String)> = sqlx::query_as(
        r#"
      SELECT f.id, f.plugin
      FROM feeds f
      WHERE NOT EXISTS (
        SELECT 1 FROM scrapes
        WHERE feed_id = f.id
        AND state = 'WAITING'
      )
      LIMIT $1
      "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut requests = Vec::with_capacity(feeds.len());
    for (feed_id, plugin) in feeds {
        let scrape_records: Vec<ScrapeRecord> = sqlx::query_as(&format!(
            r#"
          SELECT {SCRAPE_COLUMNS}
          FROM scrapes
          WHERE feed_id = $1
          ORDER BY scheduled_start_at DESC
          LIMIT 10
          "#
        ))
        .bind(feed_id)
        .fetch_all(pool)
        .await?;

        let post_records: Vec<PostSummaryRecord> = sqlx::query_as(
            r#"
          SELECT id, title, author, url, posted_at, FALSE AS read
          FROM posts
          WHERE feed_id = $1
          ORDER BY posted_at DESC
          LIMIT 10
          "#,
        )
        .bind(feed_id)
        .fetch_all(pool)
        .await?;

        requests.push(ScheduleRequest {
            feed_id,
            plugin,
            latest_scrapes: scrape_records
                .into_iter()
                .map(Scrape::try_from)
                .collect::<Result<_, _>>()?,
            latest_posts: post_records.into_iter().map(Into::into).collect(),
        });
    }

    Ok(requests)
}

/// Inserts each proposed schedule as a `WAITING` scrape. The unique
/// constraint on `(plugin, scheduled_start_at, config)` makes re-insertion
/// a no-op, which is the whole coordination story between concurrent
/// scheduler loops.
pub async fn insert_schedule(
    pool: &PgPool,
    request: &ScheduleRequest,
    schedules: &[ScrapeSchedule],
) -> Result<(), StoreError> {
    for schedule in schedules {
        let config = serde_json::to_value(&schedule.config)
            .map_err(|e| StoreError::Internal(format!("unencodable config: {e}")))?;
        sqlx::query(
            r#"
          INSERT INTO scrapes
          (feed_id, plugin, config, scheduled_start_at)
          VALUES
          ($1, $2, $3, $4)
          ON CONFLICT (plugin, scheduled_start_at, config) DO NOTHING
          "#,
        )
        .bind(request.feed_id)
        .bind(&request.plugin)
        .bind(config)
        .bind(schedule.scheduled_start_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}
