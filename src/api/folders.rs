//! Folder endpoints.
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::{ok, session_key, ApiError, AppState};

pub async fn list_folders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let folders = state.store.get_folders_with_feeds(&key).await?;
    Ok(ok(serde_json::json!(folders)))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

pub async fn create_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateFolderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name required"));
    }
    let id = state.store.add_folder(&key, name).await?;
    Ok(ok(serde_json::json!({ "id": id })))
}
