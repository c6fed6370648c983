//! Error types for catalog operations

use std::fmt;
use thiserror::Error;

/// Kind of record a storage error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Asset,
    Tag,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Asset => f.write_str("Asset"),
            EntityKind::Tag => f.write_str("Tag"),
        }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: EntityKind, id: String },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: EntityKind, reason: String },

    #[error("Update failed for {entity} with id {id}: {reason}")]
    UpdateFailed {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Input validation errors. Raised before any side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: String, max: usize },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

impl ValidationError {
    /// Field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidValue { field, .. }
            | ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },
}

/// Master error type for all catalog operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("User {requester} does not own asset {asset_id}")]
    Forbidden { asset_id: String, requester: String },

    #[error("File {file_name} does not exist for owner {owner_id}")]
    StorageVerification { owner_id: String, file_name: String },

    #[error("Tag {value} could not be updated after {attempts} attempts")]
    TagLedgerConflict { value: String, attempts: u32 },

    #[error("{service} collaborator failed: {reason}")]
    Collaborator { service: String, reason: String },
}

impl CatalogError {
    pub fn asset_not_found(id: impl fmt::Display) -> Self {
        CatalogError::Storage(StorageError::NotFound {
            entity: EntityKind::Asset,
            id: id.to_string(),
        })
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        CatalogError::Storage(StorageError::Backend {
            reason: reason.into(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
