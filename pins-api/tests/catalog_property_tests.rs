//! Property-Based Tests for the Asset Catalog Service
//!
//! **Pagination arithmetic**: for any result size, page size, and page
//! number, `pages == ceil(total / limit)` and the page holds
//! `min(limit, total - page * limit)` items.
//!
//! **Canonical search keys**: equivalent queries (tag case and padding,
//! name case) share one cache entry.
//!
//! **Atomic tag increments**: concurrent creates never lose a count.

use std::sync::Arc;
use std::time::Duration;

use pins_api::{AssetCatalogService, OwnerEnricher};
use pins_core::{AssetDraft, CatalogConfig, Clock, ManualClock, OwnerId, SearchQuery};
use pins_storage::{InMemoryAssetStore, InMemoryCacheBackend, InMemoryTagStore, ResultCache, TagLedger};
use pins_test_utils::fixtures::{alice, draft};
use pins_test_utils::generators::arb_owner_id;
use pins_test_utils::{FakeFileStorage, FakeIdentityDirectory};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

// ============================================================================
// TEST HARNESS
// ============================================================================

struct Catalog {
    service: AssetCatalogService,
    cache: Arc<ResultCache>,
    clock: Arc<ManualClock>,
    storage: Arc<FakeFileStorage>,
    tags: Arc<InMemoryTagStore>,
}

impl Catalog {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let storage = Arc::new(FakeFileStorage::new());
        let tags = Arc::new(InMemoryTagStore::new());
        let cache = Arc::new(ResultCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            dyn_clock.clone(),
        ));
        let config = CatalogConfig::default();
        let ledger = Arc::new(TagLedger::new(
            tags.clone(),
            dyn_clock.clone(),
            config.tag_retry_limit,
        ));
        let service = AssetCatalogService::new(
            Arc::new(InMemoryAssetStore::new()),
            ledger,
            cache.clone(),
            storage.clone(),
            OwnerEnricher::new(Arc::new(FakeIdentityDirectory::new())),
            dyn_clock,
            config,
        );

        Self {
            service,
            cache,
            clock,
            storage,
            tags,
        }
    }

    async fn seed(&self, owner: &OwnerId, count: usize, tags: &[&str]) -> Result<(), String> {
        self.storage.add_file(owner, "seed.jpg");
        for i in 0..count {
            self.service
                .create(draft(&format!("Seed {}", i), "seed.jpg", tags), owner)
                .await
                .map_err(|e| e.to_string())?;
            self.clock.advance(Duration::from_secs(1));
        }
        Ok(())
    }
}

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

fn runtime() -> Result<tokio::runtime::Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(fail)
}

fn pad_and_case(value: &str, upper: bool, pad: usize) -> String {
    let cased = if upper {
        value.to_uppercase()
    } else {
        value.to_string()
    };
    format!("{}{}{}", " ".repeat(pad), cased, " ".repeat(pad))
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Page sizes and counts follow from `total` and `limit` alone.
    #[test]
    fn prop_pagination_arithmetic(
        total in 0usize..25,
        limit in 1u32..10,
        page in 0u32..5,
    ) {
        runtime()?.block_on(async move {
            let catalog = Catalog::new();
            catalog.seed(&alice(), total, &[]).await.map_err(fail)?;

            let query = SearchQuery {
                limit: Some(limit),
                page: Some(page),
                ..Default::default()
            };
            let result = catalog.service.search(&query).await.map_err(fail)?;

            let total = total as u64;
            let limit_u64 = u64::from(limit);
            let expected_pages = total.div_ceil(limit_u64);
            let expected_items = total
                .saturating_sub(u64::from(page) * limit_u64)
                .min(limit_u64);

            prop_assert_eq!(result.total, total);
            prop_assert_eq!(result.pages, expected_pages);
            prop_assert_eq!(result.items.len() as u64, expected_items);
            prop_assert_eq!(result.page, page);
            prop_assert_eq!(result.limit, limit);

            for pair in result.items.windows(2) {
                prop_assert!(pair[0].timestamp >= pair[1].timestamp);
            }
            Ok(())
        })?;
    }

    /// Equivalent queries resolve to the same cache entry.
    #[test]
    fn prop_equivalent_queries_share_cache_entry(
        upper_tag in any::<bool>(),
        tag_pad in 0usize..3,
        upper_name in any::<bool>(),
        owner in arb_owner_id(),
    ) {
        runtime()?.block_on(async move {
            let catalog = Catalog::new();
            catalog.seed(&owner, 3, &["nature"]).await.map_err(fail)?;

            let canonical = SearchQuery {
                name: Some("seed".to_string()),
                tag: Some("nature".to_string()),
                owner_id: Some(owner.to_string()),
                ..Default::default()
            };
            let variant = SearchQuery {
                name: Some(pad_and_case("seed", upper_name, 0)),
                tag: Some(pad_and_case("nature", upper_tag, tag_pad)),
                owner_id: Some(format!(" {} ", owner)),
                limit: Some(10),
                page: Some(0),
            };

            let first = catalog.service.search(&canonical).await.map_err(fail)?;
            let hits_before = catalog.cache.stats().hits;
            let second = catalog.service.search(&variant).await.map_err(fail)?;

            prop_assert_eq!(catalog.cache.stats().hits, hits_before + 1);
            prop_assert_eq!(first.total, 3);
            prop_assert_eq!(first, second);
            Ok(())
        })?;
    }

    /// Every valid draft is counted once per distinct normalized tag.
    #[test]
    fn prop_created_tags_are_counted(
        draft in pins_test_utils::generators::arb_valid_draft(),
    ) {
        runtime()?.block_on(async move {
            let catalog = Catalog::new();
            for file in &draft.files {
                catalog.storage.add_file(&alice(), &file.file_name);
            }
            let expected: std::collections::BTreeSet<String> = draft
                .tags
                .iter()
                .filter_map(|t| pins_core::normalize_tag(&t.value))
                .collect();

            let view = catalog.service.create(draft, &alice()).await.map_err(fail)?;

            prop_assert_eq!(view.tags.len(), expected.len());
            for value in &expected {
                prop_assert_eq!(catalog.tags.count_of(value).await, Some(1));
            }
            Ok(())
        })?;
    }
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_lose_tag_counts() -> Result<(), String> {
    let catalog = Arc::new(Catalog::new());
    catalog.storage.add_file(&alice(), "a.jpg");

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let catalog = catalog.clone();
            tokio::spawn(async move {
                let draft: AssetDraft = draft(&format!("Concurrent {}", i), "a.jpg", &["nature"]);
                catalog.service.create(draft, &alice()).await
            })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;
    }

    assert_eq!(catalog.tags.count_of("nature").await, Some(16));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_concurrent_creates_count_twice() -> Result<(), String> {
    let catalog = Catalog::new();
    catalog.storage.add_file(&alice(), "a.jpg");

    let owner = alice();
    let (first, second) = tokio::join!(
        catalog
            .service
            .create(draft("Left", "a.jpg", &["Nature"]), &owner),
        catalog
            .service
            .create(draft("Right", "a.jpg", &[" nature "]), &owner),
    );
    first.map_err(|e| e.to_string())?;
    second.map_err(|e| e.to_string())?;

    assert_eq!(catalog.tags.count_of("nature").await, Some(2));
    Ok(())
}
