//! Interfaces to services the catalog depends on but does not own.

use async_trait::async_trait;

use crate::asset::storage_path;
use crate::error::CatalogResult;
use crate::identity::OwnerId;
use crate::owner::OwnerProfile;

/// Object storage holding the uploaded media.
#[async_trait]
pub trait StorageCollaborator: Send + Sync {
    /// Whether `file_name` has been uploaded for `owner_id`.
    async fn file_exists(&self, owner_id: &OwnerId, file_name: &str) -> CatalogResult<bool>;

    /// Storage-relative path of a file. Never persisted on the asset.
    fn resolve_file_path(&self, owner_id: &OwnerId, file_name: &str) -> String {
        storage_path(owner_id, file_name)
    }
}

/// User directory used to attach owner profiles to assets.
#[async_trait]
pub trait IdentityCollaborator: Send + Sync {
    /// Look up many users in one call. Unknown ids are simply absent.
    async fn get_users_batch(&self, ids: &[OwnerId]) -> CatalogResult<Vec<OwnerProfile>>;
}
