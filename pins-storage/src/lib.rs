//! PINS Storage - Stores, Tag Ledger, and Result Cache
//!
//! Persistence traits for assets and tags with in-memory implementations, the
//! tag usage ledger built on top of the tag store, and the namespaced result
//! cache. The Postgres implementations live in pins-api.

pub mod assets;
pub mod cache;
pub mod ledger;
pub mod tags;

pub use assets::{AssetStore, InMemoryAssetStore};
pub use cache::{
    asset_key, canonical_search_key, search_key, CacheBackend, CacheError, CacheNamespace,
    CacheRead, CacheStats, InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError, ResultCache,
    SupportsKeyEnumeration, SupportsReset,
};
pub use ledger::{
    TagLedger, DEFAULT_POPULAR_LIMIT, DEFAULT_PREFIX_LIMIT, DEFAULT_SUGGESTION_LIMIT,
};
pub use tags::{InMemoryTagStore, TagStore, VersionedTag};
