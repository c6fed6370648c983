//! Cache backend traits and optional capabilities.
//!
//! Backends store opaque bytes under string keys. Namespace invalidation
//! needs more than get/set/delete, so backends advertise extra abilities
//! through typed capability accessors instead of being probed at runtime:
//! a backend that can list its keys returns `Some` from
//! [`CacheBackend::key_enumeration`], one that can wipe itself returns `Some`
//! from [`CacheBackend::reset_capability`].

use async_trait::async_trait;
use std::time::Duration;

use super::lmdb_backend::LmdbCacheError;

/// Error type for cache operations. Never surfaced past [`super::ResultCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Lmdb(#[from] LmdbCacheError),
}

/// Pluggable key-value store behind the result cache.
///
/// Implementations must be safe for concurrent use. The `ttl` passed to
/// [`CacheBackend::set`] lets a backend reclaim space; expiry as observed by
/// callers is decided by the result cache itself.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn key_enumeration(&self) -> Option<&dyn SupportsKeyEnumeration> {
        None
    }

    fn reset_capability(&self) -> Option<&dyn SupportsReset> {
        None
    }
}

/// Backend can list the keys it currently holds.
#[async_trait]
pub trait SupportsKeyEnumeration: Send + Sync {
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

/// Backend can drop every entry at once.
#[async_trait]
pub trait SupportsReset: Send + Sync {
    async fn reset(&self) -> Result<(), CacheError>;
}

/// Counters kept by the result cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub errors: u64,
}

impl CacheStats {
    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
