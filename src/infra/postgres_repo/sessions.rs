//! Users, login tokens and session keys. Keys and tokens are generated in
//! process and stored verbatim; the store only ever answers "is this key an
//! active session".
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::model::Session;
use crate::infra::keys::generate_key;
use crate::ports::store::StoreError;

use super::models::SessionRecord;

pub async fn user_id_for_key(pool: &PgPool, key: &str) -> Result<Uuid, StoreError> {
    sqlx::query_scalar("SELECT user_id FROM sessions WHERE key = $1 AND active = TRUE")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::InvalidKey)
}

pub async fn verify_key(pool: &PgPool, key: &str) -> Result<(), StoreError> {
    user_id_for_key(pool, key).await.map(|_| ())
}

pub async fn create_or_get_user(pool: &PgPool, email: &str) -> Result<Uuid, StoreError> {
    let id = sqlx::query_scalar(
        r#"
      INSERT INTO users
      (email)
      VALUES ($1)
      ON CONFLICT (email)
      DO UPDATE SET email = EXCLUDED.email
      RETURNING id
      "#,
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn create_login_token(
    pool: &PgPool,
    user_id: Uuid,
    user_agent: &str,
    ip: &str,
) -> Result<String, StoreError> {
    let token = generate_key();
    sqlx::query(
        r#"
      INSERT INTO login_tokens
      (token, user_id, user_agent, ip)
      VALUES ($1, $2, $3, $4)
      "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(user_agent)
    .bind(ip)
    .execute(pool)
    .await?;
    Ok(token)
}

/// Burns a one-time login token, returning whose it was. Expired or reused
/// tokens are indistinguishable from ones that never existed.
pub async fn activate_login_token(pool: &PgPool, token: &str) -> Result<Uuid, StoreError> {
    sqlx::query_scalar(
        r#"
      UPDATE login_tokens
      SET used = TRUE
      WHERE token = $1
      AND expires_at > now()
      AND used = FALSE
      RETURNING user_id
      "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::InvalidToken)
}

pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    user_agent: &str,
    ip: &str,
) -> Result<(String, String), StoreError> {
    let key = generate_key();
    sqlx::query(
        r#"
      INSERT INTO sessions
      (user_id, key, user_agent, ip)
      VALUES ($1, $2, $3, $4)
      "#,
    )
    .bind(user_id)
    .bind(&key)
    .bind(user_agent)
    .bind(ip)
    .execute(pool)
    .await?;

    let email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound("user"))?;

    Ok((email, key))
}

pub async fn list_sessions(pool: &PgPool, key: &str, page: i64) -> Result<Vec<Session>, StoreError> {
    let user_id = user_id_for_key(pool, key).await?;

    let records: Vec<SessionRecord> = sqlx::query_as(
        r#"
      SELECT created_at, user_agent, ip, active
      FROM sessions
      WHERE user_id = $1
      ORDER BY created_at DESC
      LIMIT 25 OFFSET $2
      "#,
    )
    .bind(user_id)
    .bind(page.max(0) * 25)
    .fetch_all(pool)
    .await?;

    Ok(records.into_iter().map(Into::into).collect())
}

pub async fn deactivate_session(pool: &PgPool, key: &str) -> Result<(), StoreError> {
    sqlx::query("UPDATE sessions SET active = FALSE WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}
