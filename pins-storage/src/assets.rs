//! Asset persistence interface and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use pins_core::{
    apply_search, new_asset_id, Asset, AssetFilter, AssetId, AssetPatch, CatalogError,
    CatalogResult, NewAsset, OwnerId, PageRequest, Paginated,
};
use tokio::sync::RwLock;

/// Persistence for asset records.
///
/// Implementations must make [`AssetStore::update`] and
/// [`AssetStore::increment_views`] atomic with respect to concurrent writers
/// of the same record, and must order and paginate searches exactly like
/// [`pins_core::apply_search`].
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist a new asset and return the stored record with its id.
    async fn create(&self, asset: NewAsset) -> CatalogResult<Asset>;

    async fn get(&self, id: &AssetId) -> CatalogResult<Asset>;

    /// Apply `patch` if `requester` owns the asset.
    ///
    /// Fails with `NotFound` for an unknown id and `Forbidden` when the
    /// requester is not the stored owner; in both cases nothing is written.
    async fn update(
        &self,
        id: &AssetId,
        patch: AssetPatch,
        requester: &OwnerId,
    ) -> CatalogResult<Asset>;

    /// Add one to the view counter and return the record after the increment.
    async fn increment_views(&self, id: &AssetId) -> CatalogResult<Asset>;

    async fn search(
        &self,
        filter: &AssetFilter,
        page: PageRequest,
    ) -> CatalogResult<Paginated<Asset>>;

    /// Readiness probe.
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Asset store held in process memory. Used for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<AssetId, Asset>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn create(&self, asset: NewAsset) -> CatalogResult<Asset> {
        let asset = asset.into_asset(new_asset_id());
        self.assets
            .write()
            .await
            .insert(asset.id.clone(), asset.clone());
        Ok(asset)
    }

    async fn get(&self, id: &AssetId) -> CatalogResult<Asset> {
        self.assets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::asset_not_found(id))
    }

    async fn update(
        &self,
        id: &AssetId,
        patch: AssetPatch,
        requester: &OwnerId,
    ) -> CatalogResult<Asset> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| CatalogError::asset_not_found(id))?;

        if !asset.is_owned_by(requester) {
            return Err(CatalogError::Forbidden {
                asset_id: id.to_string(),
                requester: requester.to_string(),
            });
        }

        asset.apply(&patch);
        Ok(asset.clone())
    }

    async fn increment_views(&self, id: &AssetId) -> CatalogResult<Asset> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| CatalogError::asset_not_found(id))?;
        asset.views = asset.views.saturating_add(1);
        Ok(asset.clone())
    }

    async fn search(
        &self,
        filter: &AssetFilter,
        page: PageRequest,
    ) -> CatalogResult<Paginated<Asset>> {
        let assets = self.assets.read().await;
        let matched = assets.values().filter(|a| filter.matches(a)).cloned();
        Ok(apply_search(matched, filter, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pins_core::{AssetFile, AssetFileType, AssetTag};
    use std::sync::Arc;

    fn new_asset(name: &str, owner: &str, tags: &[&str]) -> NewAsset {
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
            timestamp: Utc::now(),
        }
    }

    fn patch_name(name: &str) -> AssetPatch {
        AssetPatch {
            name: Some(name.to_string()),
            description: None,
            files: None,
            tags: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() -> CatalogResult<()> {
        let store = InMemoryAssetStore::new();
        let created = store.create(new_asset("Peak", "alice", &["nature"])).await?;
        assert_eq!(created.views, 0);
        assert_eq!(created.upvotes, 0);
        assert!(created.updated_at.is_none());

        let fetched = store.get(&created.id).await?;
        assert_eq!(fetched, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryAssetStore::new();
        let err = store.get(&AssetId::new("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_requires_owner() -> CatalogResult<()> {
        let store = InMemoryAssetStore::new();
        let created = store.create(new_asset("Peak", "alice", &[])).await?;

        let err = store
            .update(&created.id, patch_name("Stolen"), &OwnerId::new("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden { .. }));
        assert_eq!(store.get(&created.id).await?.name, "Peak");

        let updated = store
            .update(&created.id, patch_name("Summit"), &OwnerId::new("alice"))
            .await?;
        assert_eq!(updated.name, "Summit");
        assert!(updated.updated_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryAssetStore::new();
        let err = store
            .update(&AssetId::new("nope"), patch_name("x"), &OwnerId::new("alice"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_view_increments() -> CatalogResult<()> {
        let store = Arc::new(InMemoryAssetStore::new());
        let created = store.create(new_asset("Peak", "alice", &[])).await?;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let id = created.id.clone();
                tokio::spawn(async move { store.increment_views(&id).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task panicked")?;
        }

        assert_eq!(store.get(&created.id).await?.views, 50);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_filters_and_paginates() -> CatalogResult<()> {
        let store = InMemoryAssetStore::new();
        for i in 0..5 {
            store
                .create(new_asset(&format!("Lake {}", i), "alice", &["nature"]))
                .await?;
        }
        store.create(new_asset("City", "bob", &["urban"])).await?;

        let filter = AssetFilter::new(None, Some("Nature"), None);
        let page = store.search(&filter, PageRequest::new(1, 2).unwrap()).await?;
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|a| a.has_tag("nature")));

        let by_owner = AssetFilter::new(None, None, Some("bob"));
        let page = store.search(&by_owner, PageRequest::new(0, 10).unwrap()).await?;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "City");
        Ok(())
    }
}
