//! Search filters, ordering, and pagination
//!
//! Every store evaluates searches with the same rules: a conjunction of the
//! [`AssetFilter`] predicates, most-recent-first ordering by
//! `updated_at` falling back to `timestamp` (ties by id, descending), and
//! zero-based `offset = page * limit` pagination. Stores that push predicates
//! into a query engine must produce the same result as [`apply_search`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::asset::Asset;
use crate::config::CatalogConfig;
use crate::error::ValidationError;
use crate::identity::OwnerId;
use crate::tag::normalize_tag;

/// Conjunction of optional search predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AssetFilter {
    /// Case-insensitive substring of the asset name, stored lower-cased.
    pub name_contains: Option<String>,
    /// Normalized tag value that must be present on the asset.
    pub tag_equals: Option<String>,
    pub owner_id_equals: Option<OwnerId>,
}

impl AssetFilter {
    /// Build a filter from raw query values. Blank values are dropped.
    pub fn new(name: Option<&str>, tag: Option<&str>, owner_id: Option<&str>) -> Self {
        Self {
            name_contains: name
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty()),
            tag_equals: tag.and_then(normalize_tag),
            owner_id_equals: owner_id
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(OwnerId::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name_contains.is_none() && self.tag_equals.is_none() && self.owner_id_equals.is_none()
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(owner) = &self.owner_id_equals {
            if &asset.owner_id != owner {
                return false;
            }
        }
        if let Some(name) = &self.name_contains {
            if !asset.name.to_lowercase().contains(name.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag_equals {
            if !asset.has_tag(tag) {
                return false;
            }
        }
        true
    }

    /// Present query parameters as `(name, value)` pairs, in no particular order.
    pub fn query_params(&self, page: PageRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", page.page.to_string()),
            ("limit", page.limit.to_string()),
        ];
        if let Some(tag) = &self.tag_equals {
            params.push(("tag", tag.clone()));
        }
        if let Some(owner) = &self.owner_id_equals {
            params.push(("ownerId", owner.to_string()));
        }
        if let Some(name) = &self.name_contains {
            params.push(("name", name.clone()));
        }
        params
    }
}

/// Zero-based page request. `limit` is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: i64::from(u32::MAX),
            });
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }
}

/// One page of results plus the arithmetic needed to walk the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            pages: page_count(total, request.limit),
        }
    }

    pub fn map<U, F>(self, f: F) -> Paginated<U>
    where
        F: FnMut(T) -> U,
    {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
        }
    }
}

/// `ceil(total / limit)`.
pub fn page_count(total: u64, limit: u32) -> u64 {
    total.div_ceil(u64::from(limit.max(1)))
}

fn most_recent_first(a: &Asset, b: &Asset) -> Ordering {
    b.recency()
        .cmp(&a.recency())
        .then_with(|| b.id.cmp(&a.id))
}

pub fn sort_most_recent_first(assets: &mut [Asset]) {
    assets.sort_by(most_recent_first);
}

/// Filter, order, and paginate in memory.
pub fn apply_search<I>(assets: I, filter: &AssetFilter, request: PageRequest) -> Paginated<Asset>
where
    I: IntoIterator<Item = Asset>,
{
    let mut matched: Vec<Asset> = assets.into_iter().filter(|a| filter.matches(a)).collect();
    sort_most_recent_first(&mut matched);

    let total = matched.len() as u64;
    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let items = matched
        .into_iter()
        .skip(offset)
        .take(request.limit as usize)
        .collect();

    Paginated::new(items, total, request)
}

/// Raw search parameters as they arrive from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Case-insensitive substring of the asset name
    pub name: Option<String>,
    /// Tag value, matched after normalization
    pub tag: Option<String>,
    /// Owner identifier
    pub owner_id: Option<String>,
    /// Page size (default 10, maximum 100)
    pub limit: Option<u32>,
    /// Zero-based page number
    pub page: Option<u32>,
}

impl SearchQuery {
    /// Apply defaults and bounds, producing a normalized filter and page.
    pub fn resolve(
        &self,
        config: &CatalogConfig,
    ) -> Result<(AssetFilter, PageRequest), ValidationError> {
        let limit = self.limit.unwrap_or(config.default_search_limit);
        if limit == 0 || limit > config.max_search_limit {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: i64::from(config.max_search_limit),
            });
        }
        let page = PageRequest::new(self.page.unwrap_or(0), limit)?;
        let filter = AssetFilter::new(
            self.name.as_deref(),
            self.tag.as_deref(),
            self.owner_id.as_deref(),
        );
        Ok((filter, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetFile, AssetFileType, AssetTag, NewAsset};
    use crate::identity::AssetId;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn asset(id: &str, name: &str, owner: &str, tags: &[&str], age_secs: i64) -> Asset {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        NewAsset {
            name: name.to_string(),
            description: String::new(),
            files: vec![AssetFile::new("a.jpg", 0, AssetFileType::Image)],
            tags: tags
                .iter()
                .map(|t| AssetTag {
                    value: t.to_string(),
                })
                .collect(),
            owner_id: OwnerId::new(owner),
            timestamp: base - Duration::seconds(age_secs),
        }
        .into_asset(AssetId::new(id))
    }

    #[test]
    fn test_filter_normalizes_inputs() {
        let filter = AssetFilter::new(Some(" Mountain "), Some(" Nature "), Some("  "));
        assert_eq!(filter.name_contains.as_deref(), Some("mountain"));
        assert_eq!(filter.tag_equals.as_deref(), Some("nature"));
        assert!(filter.owner_id_equals.is_none());
    }

    #[test]
    fn test_filter_is_conjunction() {
        let a = asset("1", "Mountain Lake", "alice", &["nature"], 0);
        let filter = AssetFilter::new(Some("lake"), Some("nature"), Some("alice"));
        assert!(filter.matches(&a));

        let wrong_owner = AssetFilter::new(Some("lake"), Some("nature"), Some("bob"));
        assert!(!wrong_owner.matches(&a));

        let wrong_tag = AssetFilter::new(Some("lake"), Some("city"), None);
        assert!(!wrong_tag.matches(&a));
    }

    #[test]
    fn test_tag_filter_is_exact_on_normalized_value() {
        let a = asset("1", "x", "alice", &["naturepark"], 0);
        let filter = AssetFilter::new(None, Some("nature"), None);
        assert!(!filter.matches(&a));
    }

    #[test]
    fn test_sort_prefers_updated_at() {
        let old = asset("1", "old", "alice", &[], 100);
        let mut touched = asset("2", "touched", "alice", &[], 500);
        touched.updated_at = Some(old.timestamp + Duration::seconds(10));
        let fresh = asset("3", "fresh", "alice", &[], 50);

        let page = apply_search(
            vec![old, touched, fresh],
            &AssetFilter::default(),
            PageRequest::new(0, 10).unwrap(),
        );
        let names: Vec<_> = page.items.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["fresh", "touched", "old"]);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let assets: Vec<_> = (0..3).map(|i| asset(&i.to_string(), "a", "o", &[], i)).collect();
        let page = apply_search(assets, &AssetFilter::default(), PageRequest::new(5, 2).unwrap());
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(PageRequest::new(0, 0).is_err());
    }

    #[test]
    fn test_resolve_applies_defaults_and_bounds() {
        let config = CatalogConfig::default();
        let (filter, page) = SearchQuery::default().resolve(&config).unwrap();
        assert!(filter.is_empty());
        assert_eq!(page.limit(), 10);
        assert_eq!(page.page(), 0);

        let too_big = SearchQuery {
            limit: Some(101),
            ..Default::default()
        };
        assert!(too_big.resolve(&config).is_err());
    }

    proptest! {
        #[test]
        fn prop_pagination_arithmetic(total in 0usize..250, limit in 1u32..40, page in 0u32..20) {
            let assets: Vec<_> = (0..total)
                .map(|i| asset(&format!("{:05}", i), "a", "o", &[], i as i64))
                .collect();
            let request = PageRequest::new(page, limit).unwrap();
            let result = apply_search(assets, &AssetFilter::default(), request);

            let expected_pages = (total as u64 + u64::from(limit) - 1) / u64::from(limit);
            prop_assert_eq!(result.pages, expected_pages);
            prop_assert_eq!(result.total, total as u64);

            let offset = page as usize * limit as usize;
            let expected_items = if offset >= total { 0 } else { (limit as usize).min(total - offset) };
            prop_assert_eq!(result.items.len(), expected_items);
        }

        #[test]
        fn prop_pages_partition_results(total in 1usize..60, limit in 1u32..10) {
            let assets: Vec<_> = (0..total)
                .map(|i| asset(&format!("{:05}", i), "a", "o", &[], (i % 7) as i64))
                .collect();
            let pages = page_count(total as u64, limit);
            let mut seen = Vec::new();
            for p in 0..pages as u32 {
                let request = PageRequest::new(p, limit).unwrap();
                let page = apply_search(assets.clone(), &AssetFilter::default(), request);
                seen.extend(page.items.into_iter().map(|a| a.id));
            }
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
        }
    }
}
