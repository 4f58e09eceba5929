#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use wordapp_backend_rust::auth::sign_jwt_hs256;
use wordapp_backend_rust::build_app;
use wordapp_backend_rust::cache::{MemoryCache, ViewCache};
use wordapp_backend_rust::clock::{FixedClock, StudyZone};
use wordapp_backend_rust::db::{MemoryStore, Repositories};
use wordapp_backend_rust::services::StudyEngine;
use wordapp_backend_rust::state::{AppState, StorageKind};

pub const TEST_SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<FixedClock>,
    pub store: Arc<MemoryStore>,
}

/// 2024-03-01 10:00 in UTC+8.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap()
}

pub fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(start()));
    let engine = StudyEngine::new(
        Repositories::from_store(store.clone()),
        ViewCache::with_default_ttl(Arc::new(MemoryCache::new())),
        clock.clone(),
        StudyZone::default(),
    );
    let state = AppState::new(
        Arc::new(engine),
        clock.clone(),
        Some(TEST_SECRET.to_string()),
        StorageKind::Memory,
    );
    TestApp {
        router: build_app(state),
        clock,
        store,
    }
}

pub fn token_for(username: &str) -> String {
    sign_jwt_hs256(username, TEST_SECRET, None).unwrap()
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    pub async fn send_text(&self, uri: &str, token: &str, text: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(text.to_string()))
            .unwrap();
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
