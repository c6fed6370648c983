//! Outcome of a cached lookup.

use pins_core::Timestamp;

/// Where a [`CacheRead`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from an unexpired cache entry.
    Cache,
    /// Computed because the entry was missing, expired, or unreadable.
    Computed,
}

/// A value returned by the result cache, with the metadata callers need for
/// metrics and logging.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Timestamp,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Cache,
        }
    }

    pub fn computed(value: T, computed_at: Timestamp) -> Self {
        Self {
            value,
            cached_at: computed_at,
            source: ReadSource::Computed,
        }
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// When the value was originally produced.
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
