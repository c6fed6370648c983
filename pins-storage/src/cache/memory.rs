//! Process-local cache backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{CacheBackend, CacheError, SupportsKeyEnumeration, SupportsReset};

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Concurrent in-memory backend over a `DashMap`. Entries are dropped lazily
/// once their TTL has elapsed.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, MemoryEntry>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        // remove_if avoids holding a read guard while deleting
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn key_enumeration(&self) -> Option<&dyn SupportsKeyEnumeration> {
        Some(self)
    }

    fn reset_capability(&self) -> Option<&dyn SupportsReset> {
        Some(self)
    }
}

#[async_trait]
impl SupportsKeyEnumeration for InMemoryCacheBackend {
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[async_trait]
impl SupportsReset for InMemoryCacheBackend {
    async fn reset(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
