mod health;
mod study;
mod words;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::db::models::User;
use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/words", words::router())
        .nest("/api/study", study::router())
        .fallback(fallback_handler)
        .with_state(state)
}

/// Authenticates the bearer token and resolves the caller's user record.
async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let username = crate::auth::authenticate(headers, state.jwt_secret(), state.clock().now())?;
    Ok(state.engine().provision_user(&username).await?)
}

async fn fallback_handler() -> Response {
    AppError::not_found("接口不存在").into_response()
}
