//! Namespaced get-or-compute cache over a pluggable backend.
//!
//! Values are JSON-encoded inside an envelope that records when they were
//! produced and when they stop being valid. Expiry is judged against the
//! injected [`Clock`], so the backend's own TTL handling is only a space
//! reclamation hint.
//!
//! Failures never escape: an unreachable backend or an undecodable entry is
//! logged and treated as a miss, and invalidation errors are logged and
//! swallowed. The caller always gets either a cached value or a freshly
//! computed one.
//!
//! Each namespace carries a generation that every invalidation bumps. A value
//! computed across an invalidation of its namespace is returned to the caller
//! but never left in the backend.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use pins_core::{Clock, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::keys::CacheNamespace;
use super::read::CacheRead;
use super::traits::{CacheBackend, CacheStats};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    cached_at: Timestamp,
    expires_at: Timestamp,
    value: T,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Generations {
    asset: AtomicU64,
    search: AtomicU64,
}

impl Generations {
    fn of(&self, namespace: CacheNamespace) -> &AtomicU64 {
        match namespace {
            CacheNamespace::Asset => &self.asset,
            CacheNamespace::Search => &self.search,
        }
    }

    fn current(&self, namespace: CacheNamespace) -> u64 {
        self.of(namespace).load(Ordering::SeqCst)
    }

    fn advance(&self, namespace: CacheNamespace) {
        self.of(namespace).fetch_add(1, Ordering::SeqCst);
    }
}

/// Result cache shared by every request handler.
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    /// Keys written per namespace since that namespace was last invalidated.
    tracked: Mutex<HashMap<CacheNamespace, HashSet<String>>>,
    generations: Generations,
    counters: Counters,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            tracked: Mutex::new(HashMap::new()),
            generations: Generations::default(),
            counters: Counters::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Return the cached value for `key`, or run `compute`, cache its result
    /// for `ttl`, and return that.
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    /// A value computed while its namespace was invalidated is returned but
    /// not cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let full_key = namespace.key(key);

        if let Some(envelope) = self.lookup::<T>(&full_key).await {
            if envelope.expires_at > self.clock.now() {
                Counters::bump(&self.counters.hits);
                tracing::debug!(namespace = %namespace, key = %full_key, "Cache hit");
                return Ok(CacheRead::from_cache(envelope.value, envelope.cached_at));
            }
            tracing::debug!(namespace = %namespace, key = %full_key, "Cache entry expired");
            self.delete_quietly(&full_key).await;
        }

        Counters::bump(&self.counters.misses);
        tracing::debug!(namespace = %namespace, key = %full_key, "Cache miss");

        let generation = self.generations.current(namespace);
        let value = compute().await?;
        let computed_at = self.clock.now();

        if self.generations.current(namespace) != generation {
            tracing::debug!(
                namespace = %namespace,
                key = %full_key,
                "Invalidated during compute; result not cached"
            );
            return Ok(CacheRead::computed(value, computed_at));
        }

        self.store(namespace, full_key.clone(), &value, ttl, computed_at)
            .await;
        // an invalidation that landed during the write may have run its
        // delete before the write did
        if self.generations.current(namespace) != generation {
            self.delete_quietly(&full_key).await;
        }
        Ok(CacheRead::computed(value, computed_at))
    }

    /// Drop a single entry. Failures are logged.
    pub async fn invalidate(&self, namespace: CacheNamespace, key: &str) {
        let full_key = namespace.key(key);
        Counters::bump(&self.counters.invalidations);
        self.generations.advance(namespace);
        self.delete_quietly(&full_key).await;
        if let Some(keys) = self.tracked_keys().get_mut(&namespace) {
            keys.remove(&full_key);
        }
    }

    /// Drop every entry of a namespace. Failures are logged.
    ///
    /// Deletes the keys this instance wrote under the namespace. When it has
    /// written none, asks the backend to enumerate the namespace prefix, and
    /// when that is unavailable or fails, resets the whole backend.
    pub async fn invalidate_namespace(&self, namespace: CacheNamespace) {
        Counters::bump(&self.counters.invalidations);
        self.generations.advance(namespace);

        let tracked: Vec<String> = self
            .tracked_keys()
            .remove(&namespace)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default();

        if !tracked.is_empty() {
            tracing::debug!(
                namespace = %namespace,
                keys = tracked.len(),
                "Invalidating tracked cache keys"
            );
            for key in &tracked {
                self.delete_quietly(key).await;
            }
            return;
        }

        if self.invalidate_by_enumeration(namespace).await {
            return;
        }

        match self.backend.reset_capability() {
            Some(resettable) => match resettable.reset().await {
                Ok(()) => {
                    tracing::debug!(
                        namespace = %namespace,
                        backend = self.backend.name(),
                        "Cache reset to invalidate namespace"
                    );
                    self.tracked_keys().clear();
                }
                Err(e) => {
                    Counters::bump(&self.counters.errors);
                    tracing::warn!(
                        namespace = %namespace,
                        error = %e,
                        "Cache reset failed; namespace left to expire"
                    );
                }
            },
            None => {
                tracing::debug!(
                    namespace = %namespace,
                    backend = self.backend.name(),
                    "Backend cannot enumerate or reset; namespace left to expire"
                );
            }
        }
    }

    /// Number of keys currently tracked for a namespace.
    pub fn tracked_key_count(&self, namespace: CacheNamespace) -> usize {
        self.tracked_keys()
            .get(&namespace)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Returns true when the namespace was cleared through key enumeration.
    async fn invalidate_by_enumeration(&self, namespace: CacheNamespace) -> bool {
        let Some(enumerable) = self.backend.key_enumeration() else {
            return false;
        };

        match enumerable.keys_with_prefix(namespace.prefix()).await {
            Ok(keys) => {
                tracing::debug!(
                    namespace = %namespace,
                    keys = keys.len(),
                    "Invalidating enumerated cache keys"
                );
                for key in &keys {
                    self.delete_quietly(key).await;
                }
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(
                    namespace = %namespace,
                    error = %e,
                    "Cache key enumeration failed"
                );
                false
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, full_key: &str) -> Option<CacheEnvelope<T>> {
        let bytes = match self.backend.get(full_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(key = %full_key, error = %e, "Cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEnvelope<T>>(&bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(
                    key = %full_key,
                    error = %e,
                    "Undecodable cache entry; treating as miss"
                );
                self.delete_quietly(full_key).await;
                None
            }
        }
    }

    async fn store<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        full_key: String,
        value: &T,
        ttl: Duration,
        now: Timestamp,
    ) {
        let lifetime = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::zero());
        let envelope = CacheEnvelope {
            cached_at: now,
            expires_at: now + lifetime,
            value,
        };

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(key = %full_key, error = %e, "Cache value not serializable");
                return;
            }
        };

        match self.backend.set(&full_key, bytes, ttl).await {
            Ok(()) => {
                Counters::bump(&self.counters.writes);
                self.tracked_keys()
                    .entry(namespace)
                    .or_default()
                    .insert(full_key);
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(key = %full_key, error = %e, "Cache write failed");
            }
        }
    }

    async fn delete_quietly(&self, full_key: &str) {
        if let Err(e) = self.backend.delete(full_key).await {
            Counters::bump(&self.counters.errors);
            tracing::warn!(key = %full_key, error = %e, "Cache delete failed");
        }
    }

    fn tracked_keys(&self) -> MutexGuard<'_, HashMap<CacheNamespace, HashSet<String>>> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheBackend;
    use crate::cache::traits::{CacheError, SupportsKeyEnumeration, SupportsReset};
    use async_trait::async_trait;
    use pins_core::ManualClock;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(60);

    fn cache_with(backend: Arc<dyn CacheBackend>) -> (Arc<ManualClock>, ResultCache) {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let cache = ResultCache::new(backend, clock.clone());
        (clock, cache)
    }

    fn memory_cache() -> (Arc<ManualClock>, Arc<InMemoryCacheBackend>, ResultCache) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let (clock, cache) = cache_with(backend.clone());
        (clock, backend, cache)
    }

    async fn counted(
        cache: &ResultCache,
        ns: CacheNamespace,
        key: &str,
        calls: &AtomicUsize,
    ) -> CacheRead<usize> {
        let result: Result<_, String> = cache
            .get_or_compute(ns, key, TTL, || async {
                Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await;
        result.expect("compute never fails here")
    }

    /// Backend with get/set/delete only.
    #[derive(Default)]
    struct PlainBackend {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl CacheBackend for PlainBackend {
        fn name(&self) -> &'static str {
            "plain"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    /// Backend whose enumeration always fails but which can reset.
    #[derive(Default)]
    struct BrokenEnumerationBackend {
        inner: PlainBackend,
        resets: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for BrokenEnumerationBackend {
        fn name(&self) -> &'static str {
            "broken-enumeration"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }

        fn key_enumeration(&self) -> Option<&dyn SupportsKeyEnumeration> {
            Some(self)
        }

        fn reset_capability(&self) -> Option<&dyn SupportsReset> {
            Some(self)
        }
    }

    #[async_trait]
    impl SupportsKeyEnumeration for BrokenEnumerationBackend {
        async fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Backend("SCAN disabled".to_string()))
        }
    }

    #[async_trait]
    impl SupportsReset for BrokenEnumerationBackend {
        async fn reset(&self) -> Result<(), CacheError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.inner.entries.lock().unwrap().clear();
            Ok(())
        }
    }

    /// Backend that fails every call.
    struct UnreachableBackend;

    #[async_trait]
    impl CacheBackend for UnreachableBackend {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let (_clock, _backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        let first = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        let second = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;

        assert!(!first.was_cache_hit());
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_expiry_follows_clock() {
        let (clock, _backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        clock.advance(Duration::from_secs(59));
        assert!(counted(&cache, CacheNamespace::Asset, "a1", &calls).await.was_cache_hit());

        clock.advance(Duration::from_secs(1));
        let after = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        assert!(!after.was_cache_hit());
        assert_eq!(after.into_value(), 2);
    }

    #[tokio::test]
    async fn test_compute_error_is_not_cached() {
        let (_clock, backend, cache) = memory_cache();

        let failed: Result<CacheRead<u32>, String> = cache
            .get_or_compute(CacheNamespace::Asset, "a1", TTL, || async {
                Err("store down".to_string())
            })
            .await;
        assert_eq!(failed.unwrap_err(), "store down");
        assert!(backend.is_empty());
        assert_eq!(cache.tracked_key_count(CacheNamespace::Asset), 0);
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let (_clock, _backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        counted(&cache, CacheNamespace::Asset, "same", &calls).await;
        counted(&cache, CacheNamespace::Search, "same", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.invalidate_namespace(CacheNamespace::Search).await;
        assert!(counted(&cache, CacheNamespace::Asset, "same", &calls).await.was_cache_hit());
        assert!(!counted(&cache, CacheNamespace::Search, "same", &calls).await.was_cache_hit());
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let (_clock, backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        counted(&cache, CacheNamespace::Asset, "a2", &calls).await;
        cache.invalidate(CacheNamespace::Asset, "a1").await;

        assert!(!backend.contains_key("assets:id:a1"));
        assert!(backend.contains_key("assets:id:a2"));
        assert_eq!(cache.tracked_key_count(CacheNamespace::Asset), 1);
    }

    #[tokio::test]
    async fn test_namespace_invalidation_uses_tracked_keys() {
        let (_clock, backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        counted(&cache, CacheNamespace::Search, "limit:10:page:0", &calls).await;
        counted(&cache, CacheNamespace::Search, "limit:10:page:1", &calls).await;
        counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        assert_eq!(cache.tracked_key_count(CacheNamespace::Search), 2);

        cache.invalidate_namespace(CacheNamespace::Search).await;

        assert_eq!(cache.tracked_key_count(CacheNamespace::Search), 0);
        assert_eq!(backend.len(), 1);
        assert!(backend.contains_key("assets:id:a1"));
    }

    #[tokio::test]
    async fn test_namespace_invalidation_falls_back_to_enumeration() {
        let (_clock, backend, cache) = memory_cache();
        // written by another process: not tracked here
        backend
            .set("assets:search:tag:x", b"{}".to_vec(), TTL)
            .await
            .unwrap();
        backend.set("assets:id:a1", b"{}".to_vec(), TTL).await.unwrap();

        cache.invalidate_namespace(CacheNamespace::Search).await;

        assert!(!backend.contains_key("assets:search:tag:x"));
        assert!(backend.contains_key("assets:id:a1"));
    }

    #[tokio::test]
    async fn test_namespace_invalidation_falls_back_to_reset() {
        let backend = Arc::new(BrokenEnumerationBackend::default());
        let (_clock, cache) = cache_with(backend.clone());
        backend
            .set("assets:search:tag:x", b"{}".to_vec(), TTL)
            .await
            .unwrap();

        cache.invalidate_namespace(CacheNamespace::Search).await;

        assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
        assert!(backend.get("assets:search:tag:x").await.unwrap().is_none());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_namespace_invalidation_without_capabilities_is_quiet() {
        let backend = Arc::new(PlainBackend::default());
        let (_clock, cache) = cache_with(backend.clone());
        backend
            .set("assets:search:tag:x", b"{}".to_vec(), TTL)
            .await
            .unwrap();

        cache.invalidate_namespace(CacheNamespace::Search).await;

        // nothing to delete with, entry survives until its TTL
        assert!(backend.get("assets:search:tag:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_compute() {
        let (_clock, cache) = cache_with(Arc::new(UnreachableBackend));
        let calls = AtomicUsize::new(0);

        let first = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        let second = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        assert!(!first.was_cache_hit());
        assert!(!second.was_cache_hit());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.invalidate(CacheNamespace::Asset, "a1").await;
        cache.invalidate_namespace(CacheNamespace::Search).await;
        assert!(cache.stats().errors >= 4);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let (_clock, backend, cache) = memory_cache();
        backend
            .set("assets:id:a1", b"not json".to_vec(), TTL)
            .await
            .unwrap();
        let calls = AtomicUsize::new(0);

        let read = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        assert!(!read.was_cache_hit());
        assert_eq!(read.into_value(), 1);
        assert!(counted(&cache, CacheNamespace::Asset, "a1", &calls).await.was_cache_hit());
    }

    #[tokio::test]
    async fn test_value_computed_across_invalidation_is_not_cached() {
        let (_clock, backend, cache) = memory_cache();

        let shared = &cache;
        let stale: Result<_, String> = cache
            .get_or_compute(CacheNamespace::Asset, "a1", TTL, move || async move {
                // an update commits and invalidates while this read is in flight
                shared.invalidate(CacheNamespace::Asset, "a1").await;
                Ok("before update".to_string())
            })
            .await;
        assert_eq!(stale.unwrap().into_value(), "before update");
        assert!(!backend.contains_key("assets:id:a1"));

        let fresh: Result<_, String> = cache
            .get_or_compute(CacheNamespace::Asset, "a1", TTL, || async {
                Ok("after update".to_string())
            })
            .await;
        let fresh = fresh.unwrap();
        assert!(!fresh.was_cache_hit());
        assert_eq!(fresh.into_value(), "after update");
        assert!(backend.contains_key("assets:id:a1"));
    }

    #[tokio::test]
    async fn test_namespace_invalidation_during_compute_skips_write() {
        let (_clock, backend, cache) = memory_cache();

        let shared = &cache;
        let read: Result<_, String> = cache
            .get_or_compute(CacheNamespace::Search, "limit:10:page:0", TTL, move || async move {
                shared.invalidate_namespace(CacheNamespace::Search).await;
                Ok(1u32)
            })
            .await;
        assert_eq!(read.unwrap().into_value(), 1);
        assert!(backend.is_empty());
        assert_eq!(cache.tracked_key_count(CacheNamespace::Search), 0);
    }

    #[tokio::test]
    async fn test_other_namespace_invalidation_keeps_write() {
        let (_clock, backend, cache) = memory_cache();

        let shared = &cache;
        let read: Result<_, String> = cache
            .get_or_compute(CacheNamespace::Asset, "a1", TTL, move || async move {
                shared.invalidate_namespace(CacheNamespace::Search).await;
                Ok(1u32)
            })
            .await;
        assert_eq!(read.unwrap().into_value(), 1);
        assert!(backend.contains_key("assets:id:a1"));
    }

    #[tokio::test]
    async fn test_cached_at_is_preserved_on_hit() {
        let (clock, _backend, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        let produced_at = counted(&cache, CacheNamespace::Asset, "a1", &calls).await.cached_at();
        clock.advance(Duration::from_secs(10));
        let hit = counted(&cache, CacheNamespace::Asset, "a1", &calls).await;
        assert_eq!(hit.cached_at(), produced_at);
    }
}
