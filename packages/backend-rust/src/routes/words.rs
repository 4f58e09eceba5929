use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::WordDraft;
use crate::response::{ok, AppError};
use crate::state::AppState;

use super::require_user;

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    #[serde(default)]
    correct: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_words).post(create_word))
        .route("/due", get(due_words))
        .route("/incorrect", get(incorrect_words))
        .route("/import", post(import_words))
        .route("/:id", put(update_word).delete(delete_word))
        .route("/:id/review", post(review_word))
}

async fn list_words(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let words = state
        .engine()
        .list_words(&user.username, query.q.as_deref())
        .await?;
    Ok(ok(words))
}

async fn create_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WordDraft>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let word = state.engine().create_word(&user.username, payload).await?;
    Ok(ok(word))
}

async fn update_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<WordDraft>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let word = state
        .engine()
        .update_word(&user.username, &id, payload)
        .await?;
    Ok(ok(word))
}

async fn delete_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    state.engine().delete_word(&user.username, &id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "删除成功",
    }))
}

async fn review_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let correct = payload.correct.unwrap_or(false);
    let word = state.engine().review(&user.username, &id, correct).await?;
    Ok(ok(word))
}

async fn due_words(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().due_words(&user.username).await?))
}

async fn incorrect_words(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(state.engine().incorrect_words(&user.username).await?))
}

async fn import_words(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let summary = state.engine().import_words(&user.username, &body).await?;
    Ok(ok(summary))
}
