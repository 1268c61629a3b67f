//! Post read endpoints.
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{ok, session_key, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListPostsRequest {
    pub feed_id: Uuid,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ListPostsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let posts = state
        .store
        .get_feed_posts(
            &key,
            req.feed_id,
            req.limit.unwrap_or(50),
            req.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(serde_json::json!(posts)))
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub post_id: Uuid,
}

pub async fn get_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PostRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let post = state.store.get_post(&key, req.post_id).await?;
    Ok(ok(serde_json::json!(post)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PostRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    state.store.mark_read(&key, req.post_id).await?;
    Ok(ok(serde_json::Value::Null))
}
