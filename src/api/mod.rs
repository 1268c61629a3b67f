//! The user-facing HTTP API: thin JSON-over-POST CRUD gated by the
//! `X-Hydrocarbon-Key` header, verified through the store on every request.
mod errors;
mod feeds;
mod folders;
mod keys;
mod posts;
mod scrapes;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::registry::PluginRegistry;
use crate::ports::http::Fetcher;
use crate::ports::store::Store;

pub use errors::ApiError;

pub const KEY_HEADER: &str = "x-hydrocarbon-key";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<PluginRegistry>,
    pub fetcher: Arc<dyn Fetcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/feed/list", post(feeds::list_feeds))
        .route("/v1/feed/create", post(feeds::create_feed))
        .route("/v1/feed/remove", post(feeds::remove_feed))
        .route("/v1/folder/list", post(folders::list_folders))
        .route("/v1/folder/create", post(folders::create_folder))
        .route("/v1/post/list", post(posts::list_posts))
        .route("/v1/post/get", post(posts::get_post))
        .route("/v1/post/mark_read", post(posts::mark_read))
        .route("/v1/token/create", post(keys::create_token))
        .route("/v1/key/create", post(keys::create_key))
        .route("/v1/session/list", post(keys::list_sessions))
        .route("/v1/session/deactivate", post(keys::deactivate_session))
        .route("/v1/plugins", get(scrapes::list_plugins))
        .route("/v1/scrapes", get(scrapes::list_scrapes))
        .with_state(state)
}

/// Pulls the session key out of the request headers. Verification against
/// the store is each handler's first store call.
pub(crate) fn session_key(headers: &HeaderMap) -> Result<String, ApiError> {
    let key = headers
        .get(KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim();
    if key.is_empty() {
        return Err(ApiError::new(
            axum::http::StatusCode::UNAUTHORIZED,
            "missing session key",
        ));
    }
    Ok(key.to_string())
}

/// The success envelope shared by every endpoint.
pub(crate) fn ok(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "data": data,
    }))
}
