use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;

use super::require_user;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodayQuery {
    daily_target: i64,
    new_word_ratio: i64,
    #[serde(default)]
    import_after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    started_at: DateTime<Utc>,
    duration_seconds: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/overview", get(overview))
        .route("/behavior", get(behavior))
        .route("/today", get(today))
        .route("/record", post(record))
        .route("/session", post(session))
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().stats(&user.username).await?))
}

async fn overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().overview(&user.username).await?))
}

async fn behavior(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().behavior(&user.username).await?))
}

async fn today(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TodayQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let today = state
        .engine()
        .today_queue(
            &user.username,
            query.daily_target,
            query.new_word_ratio,
            query.import_after.as_deref(),
        )
        .await?;
    Ok(ok(today))
}

async fn record(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().record_study_day(&user.username).await?))
}

async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let session = state
        .engine()
        .record_session(&user.username, payload.started_at, payload.duration_seconds)
        .await?;
    Ok(ok(session))
}
