//! Login flow: an emailable one-time token, exchanged for a session key.
//! Token delivery is out of scope here, so the token comes back in the
//! response body.
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use super::{ok, session_key, ApiError, AppState};

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
}

pub async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("valid email required"));
    }

    let user_id = state.store.create_or_get_user(&email).await?;
    let token = state
        .store
        .create_login_token(user_id, &user_agent(&headers), &client_ip(&headers))
        .await?;

    Ok(ok(serde_json::json!({ "token": token })))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub token: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = state.store.activate_login_token(req.token.trim()).await?;
    let (email, key) = state
        .store
        .create_session(user_id, &user_agent(&headers), &client_ip(&headers))
        .await?;

    Ok(ok(serde_json::json!({
        "email": email,
        "key": key,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListSessionsRequest {
    #[serde(default)]
    pub page: Option<i64>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ListSessionsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    let sessions = state
        .store
        .list_sessions(&key, req.page.unwrap_or(0))
        .await?;
    Ok(ok(serde_json::json!(sessions)))
}

pub async fn deactivate_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = session_key(&headers)?;
    state.store.verify_key(&key).await?;
    state.store.deactivate_session(&key).await?;
    Ok(ok(serde_json::Value::Null))
}
