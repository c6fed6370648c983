//! Client-supplied asset input and its validation rules

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::asset::{AssetFile, AssetFileType, AssetPatch, AssetTag, NewAsset};
use crate::error::ValidationError;
use crate::identity::{OwnerId, Timestamp};
use crate::tag::{normalize_tag, MAX_TAG_LENGTH};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// File reference in a create or update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetFileInput {
    /// Name of an already uploaded file, relative to the owner's folder
    pub file_name: String,
    /// Display order, 0 for the primary file
    #[serde(default)]
    pub order: i32,
    #[serde(rename = "type", default)]
    pub file_type: AssetFileType,
}

/// Tag in a create or update request. Normalized before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TagInput {
    pub value: String,
}

impl From<&str> for TagInput {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// Body of an asset creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub files: Vec<AssetFileInput>,
    #[serde(default)]
    pub tags: Vec<TagInput>,
}

impl AssetDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        validate_files(&self.files)?;
        validate_tags(&self.tags)
    }

    /// Convert into a storable record. Call [`AssetDraft::validate`] first.
    pub fn into_new_asset(self, owner_id: OwnerId, now: Timestamp) -> NewAsset {
        NewAsset {
            name: self.name.trim().to_string(),
            description: self.description,
            files: to_asset_files(self.files),
            tags: normalize_tags(&self.tags),
            owner_id,
            timestamp: now,
        }
    }
}

/// Body of an asset update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AssetChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub files: Option<Vec<AssetFileInput>>,
    pub tags: Option<Vec<TagInput>>,
}

impl AssetChanges {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(files) = &self.files {
            validate_files(files)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }

    pub fn into_patch(self, now: Timestamp) -> AssetPatch {
        AssetPatch {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description,
            files: self.files.map(to_asset_files),
            tags: self.tags.as_deref().map(normalize_tags),
            updated_at: now,
        }
    }
}

/// Normalize, drop blanks, and collapse duplicates (first occurrence wins).
pub fn normalize_tags(inputs: &[TagInput]) -> Vec<AssetTag> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .filter_map(|t| normalize_tag(&t.value))
        .filter(|value| seen.insert(value.clone()))
        .map(|value| AssetTag { value })
        .collect()
}

fn to_asset_files(inputs: Vec<AssetFileInput>) -> Vec<AssetFile> {
    inputs
        .into_iter()
        .map(|f| AssetFile::new(f.file_name.trim(), f.order, f.file_type))
        .collect()
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
    }
    check_length("name", trimmed, MAX_NAME_LENGTH)
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    check_length("description", description, MAX_DESCRIPTION_LENGTH)
}

fn validate_files(files: &[AssetFileInput]) -> Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "files".to_string(),
            reason: "at least one file is required".to_string(),
        });
    }
    for file in files {
        let name = file.file_name.trim();
        if name.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "files.fileName".to_string(),
            });
        }
        check_length("files.fileName", name, MAX_FILE_NAME_LENGTH)?;
        if file.order < 0 {
            return Err(ValidationError::OutOfRange {
                field: "files.order".to_string(),
                min: 0,
                max: i64::from(i32::MAX),
            });
        }
    }
    Ok(())
}

fn validate_tags(tags: &[TagInput]) -> Result<(), ValidationError> {
    for tag in tags {
        let trimmed = tag.value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "tags.value".to_string(),
            });
        }
        check_length("tags.value", trimmed, MAX_TAG_LENGTH)?;
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}
