//! Asset records and their read-time views

use serde::{Deserialize, Serialize};

use crate::identity::{AssetId, OwnerId, Timestamp};
use crate::owner::OwnerProfile;

/// Kind of media an asset file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AssetFileType {
    #[default]
    Image,
}

/// A file attached to an asset, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub file_name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(rename = "type", default)]
    pub file_type: AssetFileType,
    /// Always derived from `file_name`.
    pub thumbnail_name: String,
}

impl AssetFile {
    pub fn new(file_name: impl Into<String>, order: i32, file_type: AssetFileType) -> Self {
        let file_name = file_name.into();
        let thumbnail_name = thumbnail_name(&file_name);
        Self {
            file_name,
            order,
            file_type,
            thumbnail_name,
        }
    }
}

/// Tag reference stored on an asset. The value is already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssetTag {
    pub value: String,
}

/// Persisted asset record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub files: Vec<AssetFile>,
    #[serde(default)]
    pub tags: Vec<AssetTag>,
    pub owner_id: OwnerId,
    /// Creation time.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub downvotes: u64,
    #[serde(default)]
    pub views: u64,
}

impl Asset {
    /// Sort key for search results: last update, else creation.
    pub fn recency(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.timestamp)
    }

    pub fn is_owned_by(&self, owner_id: &OwnerId) -> bool {
        &self.owner_id == owner_id
    }

    pub fn has_tag(&self, normalized: &str) -> bool {
        self.tags.iter().any(|t| t.value == normalized)
    }

    /// Merge a patch into this record. Ownership must be checked by the caller.
    pub fn apply(&mut self, patch: &AssetPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(files) = &patch.files {
            if !files.is_empty() {
                self.files = files.clone();
            }
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        self.updated_at = Some(patch.updated_at);
    }
}

/// Asset about to be persisted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub name: String,
    pub description: String,
    pub files: Vec<AssetFile>,
    pub tags: Vec<AssetTag>,
    pub owner_id: OwnerId,
    pub timestamp: Timestamp,
}

impl NewAsset {
    pub fn into_asset(self, id: AssetId) -> Asset {
        Asset {
            id,
            name: self.name,
            description: self.description,
            files: self.files,
            tags: self.tags,
            owner_id: self.owner_id,
            timestamp: self.timestamp,
            updated_at: None,
            upvotes: 0,
            downvotes: 0,
            views: 0,
        }
    }
}

/// Field-level update. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub files: Option<Vec<AssetFile>>,
    pub tags: Option<Vec<AssetTag>>,
    pub updated_at: Timestamp,
}

/// File as returned to clients, with resolved storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetFileView {
    pub file_name: String,
    pub order: i32,
    #[serde(rename = "type")]
    pub file_type: AssetFileType,
    pub thumbnail_name: String,
    pub path: String,
    pub thumbnail_path: String,
}

/// Asset as returned to clients. This is also the cached representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    pub id: AssetId,
    pub name: String,
    pub description: String,
    pub files: Vec<AssetFileView>,
    pub tags: Vec<AssetTag>,
    pub owner_id: OwnerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerProfile>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub updated_at: Option<Timestamp>,
    pub upvotes: u64,
    pub downvotes: u64,
    pub views: u64,
}

impl AssetView {
    /// Build a view, resolving file paths with `resolve(owner_id, file_name)`.
    pub fn from_asset<F>(asset: Asset, resolve: F) -> Self
    where
        F: Fn(&OwnerId, &str) -> String,
    {
        let files = asset
            .files
            .into_iter()
            .map(|file| AssetFileView {
                path: resolve(&asset.owner_id, &file.file_name),
                thumbnail_path: resolve(&asset.owner_id, &file.thumbnail_name),
                file_name: file.file_name,
                order: file.order,
                file_type: file.file_type,
                thumbnail_name: file.thumbnail_name,
            })
            .collect();

        Self {
            id: asset.id,
            name: asset.name,
            description: asset.description,
            files,
            tags: asset.tags,
            owner_id: asset.owner_id,
            owner: None,
            timestamp: asset.timestamp,
            updated_at: asset.updated_at,
            upvotes: asset.upvotes,
            downvotes: asset.downvotes,
            views: asset.views,
        }
    }
}

/// Derive the thumbnail file name: `photo.jpg` becomes `photo-thumbnail.jpg`,
/// `photo` becomes `photo-thumbnail`.
pub fn thumbnail_name(file_name: &str) -> String {
    if let Some(dot) = file_name.rfind('.') {
        let extension = &file_name[dot..];
        let has_separator = extension.contains('/') || extension.contains('\\');
        if extension.len() > 1 && !has_separator {
            return format!("{}-thumbnail{}", &file_name[..dot], extension);
        }
    }
    format!("{}-thumbnail", file_name)
}

/// Default storage layout for a user's file.
pub fn storage_path(owner_id: &OwnerId, file_name: &str) -> String {
    format!("users/{}/{}", owner_id, file_name)
}
