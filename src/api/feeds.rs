//! Feed subscription endpoints. Creation resolves the URL to a plugin,
//! retrying with a blacklist when a plugin claims a URL its config creator
//! then chokes on.
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::app::plugin::HandlerOpts;

use super::{ok, session_key, ApiError, AppState};

/// Plugins we will blacklist before giving up on a URL entirely.
const MAX_FAILED_RESOLUTIONS: usize = 8;

#[derive(Debug, Deserialize)]
pub struct CreateFeedRequest {
    pub url: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
}

pub async fn create_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateFeedRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    state.store.verify_key(&key).await?;

    if req.url.trim().is_empty() {
        return Err(ApiError::bad_request("url required"));
    }

    let mut blacklist: Vec<String> = Vec::new();
    loop {
        let plugin = state.registry.plugin_for_entrypoint(&req.url, &blacklist)?;

        if let Some(feed) = state
            .store
            .check_if_feed_exists(&key, req.folder_id, plugin.name(), &req.url)
            .await?
        {
            return Ok(ok(serde_json::json!({
                "id": feed.id,
                "title": feed.title,
            })));
        }

        let opts = HandlerOpts {
            client: state.fetcher.clone(),
            route_params: Vec::new(),
        };
        match plugin.create_config(&req.url, &opts).await {
            Ok((title, config)) => {
                let id = state
                    .store
                    .add_feed(&key, req.folder_id, &title, plugin.name(), &req.url, &config)
                    .await?;
                return Ok(ok(serde_json::json!({
                    "id": id,
                    "title": title,
                })));
            }
            Err(e) => {
                if blacklist.len() == MAX_FAILED_RESOLUTIONS {
                    return Err(e.into());
                }
                debug!(plugin = plugin.name(), url = %req.url, error = %e, "config creation failed, trying next plugin");
                blacklist.push(plugin.name().to_string());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFeedsRequest {
    pub folder_id: Uuid,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_feeds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ListFeedsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let feeds = state
        .store
        .get_feeds_for_folder(
            &key,
            req.folder_id,
            req.limit.unwrap_or(50),
            req.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(serde_json::json!(feeds)))
}

#[derive(Debug, Deserialize)]
pub struct RemoveFeedRequest {
    pub folder_id: Uuid,
    pub feed_id: Uuid,
}

pub async fn remove_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RemoveFeedRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    state
        .store
        .remove_feed(&key, req.folder_id, req.feed_id)
        .await?;
    Ok(ok(serde_json::Value::Null))
}
