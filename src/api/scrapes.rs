//! Operational endpoints: registered plugins and scrape history.
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::domain::model::ScrapeState;

use super::{ok, session_key, ApiError, AppState};

pub async fn list_plugins(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(ok(serde_json::json!(state.registry.names())))
}

#[derive(Debug, Deserialize)]
pub struct ListScrapesQuery {
    pub state: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_scrapes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListScrapesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    state.store.verify_key(&key).await?;

    let scrape_state = ScrapeState::parse(&query.state)
        .ok_or_else(|| ApiError::bad_request(format!("unknown scrape state {:?}", query.state)))?;

    let scrapes = state
        .store
        .list_scrapes(
            scrape_state,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(serde_json::json!(scrapes)))
}
