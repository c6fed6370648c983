//! Tag persistence with compare-and-set updates.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use pins_core::{CatalogResult, Tag};
use tokio::sync::RwLock;

/// A tag together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedTag {
    pub tag: Tag,
    pub version: u64,
}

/// Storage for tag ledger entries, keyed by normalized value.
///
/// Writers never overwrite blindly: a new entry is inserted only if absent
/// and an existing one is replaced only if its version is unchanged. Every
/// successful write bumps the version.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn load(&self, value: &str) -> CatalogResult<Option<VersionedTag>>;

    /// Insert `tag` if no entry with its value exists. Returns false when one
    /// already does.
    async fn insert_new(&self, tag: &Tag) -> CatalogResult<bool>;

    /// Replace the entry if it is still at `expected_version`. Returns false
    /// when another writer got there first.
    async fn replace_if_version(&self, tag: &Tag, expected_version: u64) -> CatalogResult<bool>;

    /// Entries by count descending, ties by value ascending.
    async fn top_by_count(&self, limit: usize, offset: usize) -> CatalogResult<Vec<Tag>>;

    /// Entries with `start <= value < end`, by value ascending.
    async fn range_by_value(
        &self,
        start: &str,
        end: &str,
        limit: usize,
    ) -> CatalogResult<Vec<Tag>>;
}

/// Tag store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTagStore {
    tags: RwLock<BTreeMap<String, VersionedTag>>,
}

impl InMemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count_of(&self, value: &str) -> Option<u64> {
        self.tags.read().await.get(value).map(|v| v.tag.count)
    }
}

#[async_trait]
impl TagStore for InMemoryTagStore {
    async fn load(&self, value: &str) -> CatalogResult<Option<VersionedTag>> {
        Ok(self.tags.read().await.get(value).cloned())
    }

    async fn insert_new(&self, tag: &Tag) -> CatalogResult<bool> {
        let mut tags = self.tags.write().await;
        if tags.contains_key(&tag.value) {
            return Ok(false);
        }
        tags.insert(
            tag.value.clone(),
            VersionedTag {
                tag: tag.clone(),
                version: 1,
            },
        );
        Ok(true)
    }

    async fn replace_if_version(&self, tag: &Tag, expected_version: u64) -> CatalogResult<bool> {
        let mut tags = self.tags.write().await;
        match tags.get_mut(&tag.value) {
            Some(current) if current.version == expected_version => {
                current.tag = tag.clone();
                current.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn top_by_count(&self, limit: usize, offset: usize) -> CatalogResult<Vec<Tag>> {
        let tags = self.tags.read().await;
        // BTreeMap iteration is by value, so a stable sort keeps value order on ties
        let mut all: Vec<Tag> = tags.values().map(|v| v.tag.clone()).collect();
        all.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn range_by_value(
        &self,
        start: &str,
        end: &str,
        limit: usize,
    ) -> CatalogResult<Vec<Tag>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let tags = self.tags.read().await;
        Ok(tags
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
            .take(limit)
            .map(|(_, v)| v.tag.clone())
            .collect())
    }
}
