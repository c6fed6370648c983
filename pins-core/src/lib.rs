//! PINS Core - Domain Types
//!
//! Data structures shared by every other crate in the workspace: assets, tags,
//! search filters and pagination, owner profiles, collaborator interfaces, and
//! the error taxonomy. Storage and transport concerns live elsewhere.

pub mod asset;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod input;
pub mod owner;
pub mod tag;

pub use asset::{
    storage_path, thumbnail_name, Asset, AssetFile, AssetFileType, AssetFileView, AssetPatch,
    AssetTag, AssetView, NewAsset,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{IdentityCollaborator, StorageCollaborator};
pub use config::CatalogConfig;
pub use error::{
    CatalogError, CatalogResult, ConfigError, EntityKind, StorageError, ValidationError,
};
pub use filter::{
    apply_search, page_count, sort_most_recent_first, AssetFilter, PageRequest, Paginated,
    SearchQuery,
};
pub use identity::{new_asset_id, AssetId, OwnerId, Timestamp};
pub use input::{normalize_tags, AssetChanges, AssetDraft, AssetFileInput, TagInput};
pub use owner::OwnerProfile;
pub use tag::{normalize_tag, prefix_upper_bound, Tag, MAX_TAG_LENGTH, TAG_PREFIX_SENTINEL};
