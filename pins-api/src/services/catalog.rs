//! Asset Catalog Service
//!
//! Coordinates the asset store, tag ledger, result cache, and collaborators
//! for the catalog's four operations. Routes call this and nothing below it.

use std::sync::Arc;

use futures_util::future::try_join_all;
use pins_core::{
    Asset, AssetChanges, AssetDraft, AssetFileInput, AssetId, AssetTag, AssetView, CatalogConfig,
    CatalogError, CatalogResult, Clock, OwnerId, Paginated, SearchQuery, StorageCollaborator,
};
use pins_storage::{
    asset_key, search_key, AssetStore, CacheNamespace, CacheRead, ResultCache, TagLedger,
};

use super::enricher::OwnerEnricher;
use crate::telemetry::metrics::with_metrics;

/// The catalog's business logic.
#[derive(Clone)]
pub struct AssetCatalogService {
    store: Arc<dyn AssetStore>,
    ledger: Arc<TagLedger>,
    cache: Arc<ResultCache>,
    storage: Arc<dyn StorageCollaborator>,
    enricher: OwnerEnricher,
    clock: Arc<dyn Clock>,
    config: CatalogConfig,
}

impl AssetCatalogService {
    pub fn new(
        store: Arc<dyn AssetStore>,
        ledger: Arc<TagLedger>,
        cache: Arc<ResultCache>,
        storage: Arc<dyn StorageCollaborator>,
        enricher: OwnerEnricher,
        clock: Arc<dyn Clock>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            storage,
            enricher,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Readiness of the backing store.
    pub async fn health_check(&self) -> CatalogResult<()> {
        self.store.health_check().await
    }

    /// Create an asset owned by `owner_id`.
    ///
    /// Every referenced file must already exist in storage; otherwise nothing
    /// is persisted. The returned view carries no owner profile.
    pub async fn create(&self, draft: AssetDraft, owner_id: &OwnerId) -> CatalogResult<AssetView> {
        draft.validate()?;
        self.verify_files(owner_id, &draft.files).await?;

        let new_asset = draft.into_new_asset(owner_id.clone(), self.clock.now());
        let asset = record_store_op("create", self.store.create(new_asset).await)?;

        tracing::info!(asset_id = %asset.id, owner_id = %owner_id, "Asset created");

        let (ledger_result, ()) = tokio::join!(
            self.ledger.record_usage(&asset.tags),
            self.cache.invalidate_namespace(CacheNamespace::Search),
        );
        self.absorb_ledger_failure(&asset.id, ledger_result);

        Ok(self.view(asset))
    }

    /// Apply `changes` to an asset owned by `requester`.
    ///
    /// Previously attached tags keep their counts; newly supplied tags are
    /// counted again.
    pub async fn update(
        &self,
        id: &AssetId,
        changes: AssetChanges,
        requester: &OwnerId,
    ) -> CatalogResult<AssetView> {
        changes.validate()?;

        let current = record_store_op("get", self.store.get(id).await)?;
        if !current.is_owned_by(requester) {
            return Err(CatalogError::Forbidden {
                asset_id: id.to_string(),
                requester: requester.to_string(),
            });
        }
        if let Some(files) = &changes.files {
            self.verify_files(&current.owner_id, files).await?;
        }

        let patch = changes.into_patch(self.clock.now());
        let new_tags: Option<Vec<AssetTag>> = patch.tags.clone();
        let asset = record_store_op("update", self.store.update(id, patch, requester).await)?;

        tracing::info!(asset_id = %asset.id, "Asset updated");

        let record_tags = async {
            match &new_tags {
                Some(tags) => self.ledger.record_usage(tags).await,
                None => Ok(()),
            }
        };
        let item_key = asset_key(id);
        let (ledger_result, (), ()) = tokio::join!(
            record_tags,
            self.cache.invalidate(CacheNamespace::Asset, &item_key),
            self.cache.invalidate_namespace(CacheNamespace::Search),
        );
        self.absorb_ledger_failure(&asset.id, ledger_result);

        Ok(self.view(asset))
    }

    /// Fetch one asset with its owner attached.
    ///
    /// A cache miss counts a view; reads served from cache do not.
    pub async fn get_by_id(&self, id: &AssetId) -> CatalogResult<AssetView> {
        let read = self
            .cache
            .get_or_compute(
                CacheNamespace::Asset,
                &asset_key(id),
                self.config.asset_cache_ttl,
                || async {
                    let asset = record_store_op("increment_views", self.store.increment_views(id).await)?;
                    Ok::<_, CatalogError>(self.enricher.enrich_one(self.view(asset)).await)
                },
            )
            .await?;

        Ok(observe_cache(CacheNamespace::Asset, read))
    }

    /// Filtered, paginated listing, most recent first.
    pub async fn search(&self, query: &SearchQuery) -> CatalogResult<Paginated<AssetView>> {
        let (filter, page) = query.resolve(&self.config)?;

        let read = self
            .cache
            .get_or_compute(
                CacheNamespace::Search,
                &search_key(&filter, page),
                self.config.search_cache_ttl,
                || async {
                    let found = record_store_op("search", self.store.search(&filter, page).await)?;
                    let mut results = found.map(|asset| self.view(asset));
                    results.items = self.enricher.enrich(results.items).await;
                    Ok::<_, CatalogError>(results)
                },
            )
            .await?;

        Ok(observe_cache(CacheNamespace::Search, read))
    }

    fn view(&self, asset: Asset) -> AssetView {
        AssetView::from_asset(asset, |owner, file| {
            self.storage.resolve_file_path(owner, file)
        })
    }

    /// Check all files concurrently; the first missing one fails the call.
    async fn verify_files(&self, owner_id: &OwnerId, files: &[AssetFileInput]) -> CatalogResult<()> {
        // checked under the same trimmed name that gets persisted
        let checks = files.iter().map(|file| async move {
            let file_name = file.file_name.trim();
            if self.storage.file_exists(owner_id, file_name).await? {
                Ok(())
            } else {
                Err(CatalogError::StorageVerification {
                    owner_id: owner_id.to_string(),
                    file_name: file_name.to_string(),
                })
            }
        });
        try_join_all(checks).await?;
        Ok(())
    }

    // The asset is already committed, so a ledger failure only costs counts.
    fn absorb_ledger_failure(&self, asset_id: &AssetId, result: CatalogResult<()>) {
        if let Err(e) = result {
            tracing::warn!(asset_id = %asset_id, error = %e, "Tag usage not fully recorded");
            with_metrics(|m| m.record_tag_ledger_failure());
        }
    }
}

fn record_store_op<T>(operation: &str, result: CatalogResult<T>) -> CatalogResult<T> {
    with_metrics(|m| m.record_store_operation(operation, result.is_ok()));
    result
}

fn observe_cache<T>(namespace: CacheNamespace, read: CacheRead<T>) -> T {
    with_metrics(|m| m.record_cache_lookup(namespace.label(), read.was_cache_hit()));
    read.into_value()
}
