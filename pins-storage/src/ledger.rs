//! Tag usage accounting.
//!
//! Every time an asset is created or updated with tags, each distinct
//! normalized value gets its use count bumped. Concurrent writers on the same
//! value are reconciled through the store's versioned compare-and-set, retried
//! a bounded number of times.

use std::collections::HashSet;
use std::sync::Arc;

use pins_core::{
    normalize_tag, prefix_upper_bound, AssetTag, CatalogError, CatalogResult, Clock, Tag,
};

use crate::tags::TagStore;

pub const DEFAULT_POPULAR_LIMIT: usize = 20;
pub const DEFAULT_PREFIX_LIMIT: usize = 10;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Use counts of tag values.
pub struct TagLedger {
    store: Arc<dyn TagStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl TagLedger {
    pub fn new(store: Arc<dyn TagStore>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Count one use of each distinct value in `tags`.
    ///
    /// Every value is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub async fn record_usage(&self, tags: &[AssetTag]) -> CatalogResult<()> {
        let mut seen = HashSet::new();
        let mut first_error = None;

        for value in tags.iter().filter_map(|t| normalize_tag(&t.value)) {
            if !seen.insert(value.clone()) {
                continue;
            }
            if let Err(e) = self.increment(&value).await {
                tracing::warn!(tag = %value, error = %e, "Failed to record tag usage");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Create the entry with count 1 or add one to it.
    pub async fn increment(&self, value: &str) -> CatalogResult<Tag> {
        for attempt in 1..=self.max_attempts {
            let now = self.clock.now();
            match self.store.load(value).await? {
                None => {
                    let tag = Tag::first_use(value, now);
                    if self.store.insert_new(&tag).await? {
                        return Ok(tag);
                    }
                }
                Some(current) => {
                    let next = current.tag.incremented(now);
                    if self.store.replace_if_version(&next, current.version).await? {
                        return Ok(next);
                    }
                }
            }
            tracing::debug!(tag = %value, attempt, "Tag update lost a race; retrying");
        }

        Err(CatalogError::TagLedgerConflict {
            value: value.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Most used tags, count descending then value ascending.
    pub async fn popular(&self, limit: usize, offset: usize) -> Vec<Tag> {
        self.store
            .top_by_count(limit, offset)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load popular tags");
                Vec::new()
            })
    }

    /// Tags starting with `prefix` (normalized), by value ascending.
    pub async fn search_by_prefix(&self, prefix: &str, limit: usize) -> Vec<Tag> {
        let Some(prefix) = normalize_tag(prefix) else {
            return Vec::new();
        };
        let upper = prefix_upper_bound(&prefix);
        self.store
            .range_by_value(&prefix, &upper, limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(prefix = %prefix, error = %e, "Failed to search tags");
                Vec::new()
            })
    }

    /// Popular tags the caller does not already have.
    pub async fn suggest(&self, existing: &[String], limit: usize) -> Vec<Tag> {
        let exclude: HashSet<String> = existing.iter().filter_map(|t| normalize_tag(t)).collect();
        if exclude.is_empty() {
            return self.popular(limit, 0).await;
        }

        self.popular(limit + exclude.len(), 0)
            .await
            .into_iter()
            .filter(|tag| !exclude.contains(&tag.value))
            .take(limit)
            .collect()
    }
}
