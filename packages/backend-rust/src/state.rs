use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheBackend, MemoryCache, RedisCache, ViewCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{DbInitError, MemoryStore, Repositories, SqliteStore};
use crate::services::StudyEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Sqlite => "sqlite",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    engine: Arc<StudyEngine>,
    clock: Arc<dyn Clock>,
    jwt_secret: Option<Arc<str>>,
    storage: StorageKind,
}

impl AppState {
    pub fn new(
        engine: Arc<StudyEngine>,
        clock: Arc<dyn Clock>,
        jwt_secret: Option<String>,
        storage: StorageKind,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            engine,
            clock,
            jwt_secret: jwt_secret.map(Arc::from),
            storage,
        }
    }

    /// Wires storage and cache from configuration. Without `DATABASE_URL` the
    /// process runs on a volatile in-memory store.
    pub async fn from_config(config: &Config) -> Result<Self, DbInitError> {
        let (repos, storage) = match config.database_url.as_deref() {
            Some(url) => {
                let store = SqliteStore::connect(url).await?;
                tracing::info!("sqlite store ready");
                (Repositories::from_store(Arc::new(store)), StorageKind::Sqlite)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                (
                    Repositories::from_store(Arc::new(MemoryStore::new())),
                    StorageKind::Memory,
                )
            }
        };

        let backend = cache_backend(config.redis_url.as_deref()).await;
        let cache = ViewCache::new(backend, config.cache_ttl);
        cache.set_enabled(config.cache_enabled);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let engine = StudyEngine::new(repos, cache, clock.clone(), config.study_zone)
            .with_min_session_seconds(config.min_session_seconds);

        if config.jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET not set, authenticated routes will fail");
        }

        Ok(Self::new(
            Arc::new(engine),
            clock,
            config.jwt_secret.clone(),
            storage,
        ))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn engine(&self) -> &StudyEngine {
        &self.engine
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }
}

async fn cache_backend(redis_url: Option<&str>) -> Arc<dyn CacheBackend> {
    let Some(url) = redis_url else {
        return Arc::new(MemoryCache::new());
    };
    match RedisCache::connect(url).await {
        Ok(cache) if cache.is_connected().await => {
            tracing::info!("redis view cache connected");
            Arc::new(cache)
        }
        Ok(_) => {
            tracing::warn!("redis did not answer PING, falling back to memory cache");
            Arc::new(MemoryCache::new())
        }
        Err(err) => {
            tracing::warn!(error = %err, "redis unavailable, falling back to memory cache");
            Arc::new(MemoryCache::new())
        }
    }
}
