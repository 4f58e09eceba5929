use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::keys::{CacheView, Mutation, VIEW_TTL};
use super::CacheBackend;

type SlotKey = (String, CacheView);

/// Bookkeeping for one (user, view) pair while it is interesting: a compute is
/// in flight or the backend may still hold a value from before an invalidation.
/// Idle, clean slots are dropped, so the map only holds active pairs.
#[derive(Debug, Default)]
struct ViewSlot {
    generation: u64,
    stale: bool,
    computing: u32,
}

impl ViewSlot {
    fn is_idle(&self) -> bool {
        !self.stale && self.computing == 0
    }
}

/// Releases the in-flight mark even when the compute future is dropped.
struct ComputeGuard<'a> {
    cache: &'a ViewCache,
    slot: SlotKey,
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.cache.slots.lock();
        if let Some(slot) = slots.get_mut(&self.slot) {
            slot.computing = slot.computing.saturating_sub(1);
            if slot.is_idle() {
                slots.remove(&self.slot);
            }
        }
    }
}

/// Read-through memoization of per-user views.
///
/// Every backend failure degrades to a recomputation. Invalidation bumps a
/// per-(user, view) generation, so a computation that started before a
/// mutation never leaves its result behind. Until the backend confirms an
/// eviction (or a newer value overwrites the key) the pair is stale and reads
/// bypass the backend.
pub struct ViewCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
    enabled: AtomicBool,
    slots: Mutex<HashMap<SlotKey, ViewSlot>>,
}

impl ViewCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
            enabled: AtomicBool::new(true),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(backend: Arc<dyn CacheBackend>) -> Self {
        Self::new(backend, VIEW_TTL)
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: VIEW_TTL,
            enabled: AtomicBool::new(false),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some() && self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Number of (user, view) pairs currently tracked.
    pub fn tracked_views(&self) -> usize {
        self.slots.lock().len()
    }

    /// Registers an in-flight compute and returns the generation it started at
    /// and whether the backend copy must be ignored.
    fn begin_compute(&self, slot: &SlotKey) -> (ComputeGuard<'_>, u64, bool) {
        let mut slots = self.slots.lock();
        let entry = slots.entry(slot.clone()).or_default();
        entry.computing += 1;
        let started = (entry.generation, entry.stale);
        drop(slots);
        let guard = ComputeGuard {
            cache: self,
            slot: slot.clone(),
        };
        (guard, started.0, started.1)
    }

    fn current_generation(&self, slot: &SlotKey) -> u64 {
        self.slots.lock().get(slot).map_or(0, |s| s.generation)
    }

    /// A value computed at `generation` now sits in the backend.
    fn mark_written(&self, slot: &SlotKey, generation: u64) {
        if let Some(entry) = self.slots.lock().get_mut(slot) {
            if entry.generation == generation {
                entry.stale = false;
            }
        }
    }

    fn mark_stale(&self, slot: &SlotKey) {
        self.slots.lock().entry(slot.clone()).or_default().stale = true;
    }

    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        view: CacheView,
        user_id: &str,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let backend = match &self.backend {
            Some(backend) if self.enabled.load(Ordering::Relaxed) => backend,
            _ => return compute().await,
        };
        let key = view.key(user_id);
        let slot: SlotKey = (user_id.to_string(), view);
        let (_guard, generation, stale) = self.begin_compute(&slot);

        if stale {
            tracing::debug!(key = %key, "skipping cache entry pending eviction");
        } else {
            match backend.get(&key).await {
                Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                    Ok(value) => {
                        tracing::trace!(key = %key, "view cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::debug!(key = %key, error = %e, "discarding unreadable cache entry")
                    }
                },
                Ok(None) => {}
                Err(e) => tracing::debug!(key = %key, error = %e, "view cache read failed"),
            }
        }

        let value = compute().await?;

        if self.current_generation(&slot) != generation {
            return Ok(value);
        }
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "view not serializable, skipping cache");
                return Ok(value);
            }
        };
        if let Err(e) = backend.set(&key, payload, self.ttl).await {
            tracing::debug!(key = %key, error = %e, "view cache write failed");
            return Ok(value);
        }
        // An invalidation may have landed while the write was in flight.
        if self.current_generation(&slot) != generation {
            if let Err(e) = backend.delete(std::slice::from_ref(&key)).await {
                tracing::warn!(key = %key, error = %e, "failed to drop raced cache entry");
                self.mark_stale(&slot);
            }
        } else {
            self.mark_written(&slot, generation);
        }
        Ok(value)
    }

    /// Drops every view the mutation affects for `user_id`. If the backend
    /// cannot evict, the views stay stale and reads recompute until it can.
    pub async fn invalidate(&self, mutation: Mutation, user_id: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        let views = mutation.invalidates();
        let bumped: Vec<(SlotKey, u64)> = {
            let mut slots = self.slots.lock();
            views
                .iter()
                .map(|view| {
                    let slot = (user_id.to_string(), *view);
                    let entry = slots.entry(slot.clone()).or_default();
                    entry.generation += 1;
                    entry.stale = true;
                    (slot, entry.generation)
                })
                .collect()
        };

        let keys: Vec<String> = views.iter().map(|v| v.key(user_id)).collect();
        match backend.delete(&keys).await {
            Ok(()) => {
                let mut slots = self.slots.lock();
                for (slot, generation) in &bumped {
                    let Some(entry) = slots.get_mut(slot) else {
                        continue;
                    };
                    if entry.generation == *generation {
                        entry.stale = false;
                    }
                    if entry.is_idle() {
                        slots.remove(slot);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    mutation = mutation.name(),
                    user_id = %user_id,
                    error = %e,
                    "cache invalidation failed, views stay bypassed"
                );
                let mut slots = self.slots.lock();
                for (slot, _) in bumped {
                    slots.entry(slot).or_default().stale = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EvictionFailingCache, FailingCache, MemoryCache};
    use std::sync::atomic::AtomicUsize;

    fn memory_cache() -> (Arc<MemoryCache>, ViewCache) {
        let backend = Arc::new(MemoryCache::new());
        let cache = ViewCache::new(backend.clone(), Duration::from_secs(60));
        (backend, cache)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (_, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<i64, ()> = cache
                .get_or_compute(CacheView::Stats, "u1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let (backend, cache) = memory_cache();
        let _: Result<i64, ()> = cache
            .get_or_compute(CacheView::DueWords, "u1", || async { Ok(1) })
            .await;
        assert!(backend.contains(&CacheView::DueWords.key("u1")));

        cache.invalidate(Mutation::Review, "u1").await;
        assert!(!backend.contains(&CacheView::DueWords.key("u1")));

        let value: Result<i64, ()> = cache
            .get_or_compute(CacheView::DueWords, "u1", || async { Ok(2) })
            .await;
        assert_eq!(value, Ok(2));
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_suppresses_write() {
        let (backend, cache) = memory_cache();

        let value: Result<i64, ()> = cache
            .get_or_compute(CacheView::Stats, "u1", || async {
                cache.invalidate(Mutation::RecordStudyDay, "u1").await;
                Ok(1)
            })
            .await;

        assert_eq!(value, Ok(1));
        assert!(!backend.contains(&CacheView::Stats.key("u1")));
    }

    #[tokio::test]
    async fn test_invalidation_is_scoped_to_user() {
        let (backend, cache) = memory_cache();
        for user in ["u1", "u2"] {
            let _: Result<i64, ()> = cache
                .get_or_compute(CacheView::WordList, user, || async { Ok(3) })
                .await;
        }

        cache.invalidate(Mutation::CreateWord, "u1").await;

        assert!(!backend.contains(&CacheView::WordList.key("u1")));
        assert!(backend.contains(&CacheView::WordList.key("u2")));
    }

    #[tokio::test]
    async fn test_failing_backend_falls_through() {
        let cache = ViewCache::new(Arc::new(FailingCache), Duration::from_secs(60));
        let value: Result<String, ()> = cache
            .get_or_compute(CacheView::Overview, "u1", || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(value.as_deref(), Ok("fresh"));
        cache.invalidate(Mutation::DeleteWord, "u1").await;
    }

    #[tokio::test]
    async fn test_failed_eviction_bypasses_old_entry() {
        let cache = ViewCache::new(
            Arc::new(EvictionFailingCache::default()),
            Duration::from_secs(60),
        );
        let first: Result<i64, ()> = cache
            .get_or_compute(CacheView::DueWords, "u1", || async { Ok(1) })
            .await;
        assert_eq!(first, Ok(1));

        cache.invalidate(Mutation::Review, "u1").await;

        let second: Result<i64, ()> = cache
            .get_or_compute(CacheView::DueWords, "u1", || async { Ok(2) })
            .await;
        assert_eq!(second, Ok(2));

        // The recomputed value overwrote the key, so the backend is trusted again.
        let third: Result<i64, ()> = cache
            .get_or_compute(CacheView::DueWords, "u1", || async { Ok(3) })
            .await;
        assert_eq!(third, Ok(2));
    }

    #[tokio::test]
    async fn test_tracked_views_are_pruned_once_clean() {
        let (_, cache) = memory_cache();
        for user in ["u1", "u2", "u3"] {
            let _: Result<i64, ()> = cache
                .get_or_compute(CacheView::Stats, user, || async { Ok(1) })
                .await;
            cache.invalidate(Mutation::Review, user).await;
        }
        assert_eq!(cache.tracked_views(), 0);

        let failing = ViewCache::new(
            Arc::new(EvictionFailingCache::default()),
            Duration::from_secs(60),
        );
        failing.invalidate(Mutation::RecordStudyDay, "u1").await;
        assert_eq!(failing.tracked_views(), 2);
        let _: Result<i64, ()> = failing
            .get_or_compute(CacheView::Stats, "u1", || async { Ok(1) })
            .await;
        assert_eq!(failing.tracked_views(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let (backend, cache) = memory_cache();
        cache.set_enabled(false);
        let _: Result<i64, ()> = cache
            .get_or_compute(CacheView::Stats, "u1", || async { Ok(1) })
            .await;
        assert!(!backend.contains(&CacheView::Stats.key("u1")));
        assert!(!ViewCache::disabled().is_enabled());
    }

    #[tokio::test]
    async fn test_compute_error_is_returned_and_not_cached() {
        let (backend, cache) = memory_cache();
        let value: Result<i64, &str> = cache
            .get_or_compute(CacheView::Stats, "u1", || async { Err("boom") })
            .await;
        assert_eq!(value, Err("boom"));
        assert!(!backend.contains(&CacheView::Stats.key("u1")));
    }
}
