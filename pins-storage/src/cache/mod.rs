//! Result cache for asset lookups and search pages.
//!
//! Two namespaces share one backend: single assets (`assets:id:`) with a long
//! TTL and search pages (`assets:search:`) with a short one. Writes to the
//! catalog invalidate the affected asset key and the whole search namespace;
//! everything else expires passively.
//!
//! # Example
//!
//! ```ignore
//! let cache = ResultCache::new(Arc::new(InMemoryCacheBackend::new()), Arc::new(SystemClock));
//!
//! let read = cache
//!     .get_or_compute(CacheNamespace::Asset, &asset_key(&id), ttl, || async {
//!         store.increment_views(&id).await
//!     })
//!     .await?;
//!
//! if read.was_cache_hit() { /* views were not incremented */ }
//! ```

pub mod keys;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod result_cache;
pub mod traits;

pub use keys::{asset_key, canonical_search_key, search_key, CacheNamespace};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use read::{CacheRead, ReadSource};
pub use result_cache::ResultCache;
pub use traits::{CacheBackend, CacheError, CacheStats, SupportsKeyEnumeration, SupportsReset};
