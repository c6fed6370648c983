//! PINS Test Utilities
//!
//! Shared test infrastructure for the PINS workspace:
//! - Fake storage and identity collaborators with call recording
//! - A tag store that always fails, for ledger degradation tests
//! - Proptest generators for catalog input
//! - Fixtures for common scenarios
//! - Assertions on `CatalogResult`

pub use pins_storage::{InMemoryAssetStore, InMemoryCacheBackend, InMemoryTagStore};

pub use pins_core::{
    Asset, AssetChanges, AssetDraft, AssetFileInput, AssetFileType, AssetId, CatalogError,
    CatalogResult, IdentityCollaborator, ManualClock, OwnerId, OwnerProfile, StorageCollaborator,
    StorageError, Tag, TagInput, Timestamp, ValidationError,
};

use async_trait::async_trait;
use pins_storage::{TagStore, VersionedTag};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// FAKE COLLABORATORS
// ============================================================================

/// Storage collaborator backed by a set of `(owner, file)` pairs.
#[derive(Debug, Default)]
pub struct FakeFileStorage {
    files: Mutex<HashSet<(OwnerId, String)>>,
    unavailable: AtomicBool,
    exists_calls: AtomicUsize,
}

impl FakeFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds the given files for `owner`.
    pub fn with_files(owner: &OwnerId, file_names: &[&str]) -> Self {
        let storage = Self::new();
        for name in file_names {
            storage.add_file(owner, name);
        }
        storage
    }

    pub fn add_file(&self, owner: &OwnerId, file_name: &str) {
        self.files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((owner.clone(), file_name.to_string()));
    }

    /// Make every subsequent call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageCollaborator for FakeFileStorage {
    async fn file_exists(&self, owner_id: &OwnerId, file_name: &str) -> CatalogResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Collaborator {
                service: "storage".to_string(),
                reason: "unavailable".to_string(),
            });
        }
        Ok(self
            .files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(owner_id.clone(), file_name.to_string())))
    }
}

/// Identity collaborator over a fixed set of profiles, recording every batch.
#[derive(Debug, Default)]
pub struct FakeIdentityDirectory {
    profiles: Mutex<HashMap<OwnerId, OwnerProfile>>,
    batches: Mutex<Vec<Vec<OwnerId>>>,
    unavailable: AtomicBool,
}

impl FakeIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = OwnerProfile>) -> Self {
        let directory = Self::new();
        for profile in profiles {
            directory.add_profile(profile);
        }
        directory
    }

    pub fn add_profile(&self, profile: OwnerProfile) {
        self.profiles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(profile.id.clone(), profile);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of batch calls made so far.
    pub fn batch_calls(&self) -> usize {
        self.batches.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Ids requested by each batch call, in call order.
    pub fn requested_batches(&self) -> Vec<Vec<OwnerId>> {
        self.batches.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl IdentityCollaborator for FakeIdentityDirectory {
    async fn get_users_batch(&self, ids: &[OwnerId]) -> CatalogResult<Vec<OwnerProfile>> {
        self.batches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ids.to_vec());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Collaborator {
                service: "identity".to_string(),
                reason: "unavailable".to_string(),
            });
        }
        let profiles = self.profiles.lock().unwrap_or_else(|p| p.into_inner());
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }
}

/// Tag store whose every call fails with a backend error.
#[derive(Debug, Default)]
pub struct UnavailableTagStore;

fn tag_store_down() -> CatalogError {
    CatalogError::backend("tag store unavailable")
}

#[async_trait]
impl TagStore for UnavailableTagStore {
    async fn load(&self, _value: &str) -> CatalogResult<Option<VersionedTag>> {
        Err(tag_store_down())
    }

    async fn insert_new(&self, _tag: &Tag) -> CatalogResult<bool> {
        Err(tag_store_down())
    }

    async fn replace_if_version(&self, _tag: &Tag, _expected: u64) -> CatalogResult<bool> {
        Err(tag_store_down())
    }

    async fn top_by_count(&self, _limit: usize, _offset: usize) -> CatalogResult<Vec<Tag>> {
        Err(tag_store_down())
    }

    async fn range_by_value(
        &self,
        _start: &str,
        _end: &str,
        _limit: usize,
    ) -> CatalogResult<Vec<Tag>> {
        Err(tag_store_down())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for catalog input.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_owner_id() -> impl Strategy<Value = OwnerId> {
        "[a-z][a-z0-9]{2,11}".prop_map(OwnerId::new)
    }

    /// Raw tag text with random case and padding.
    pub fn arb_raw_tag() -> impl Strategy<Value = String> {
        (" {0,2}", "[a-zA-Z][a-zA-Z0-9-]{0,14}", " {0,2}")
            .prop_map(|(lead, word, trail)| format!("{}{}{}", lead, word, trail))
    }

    pub fn arb_file_name() -> impl Strategy<Value = String> {
        ("[a-z0-9_-]{1,20}", prop::option::of("(jpg|png|webp|gif)")).prop_map(|(stem, ext)| {
            match ext {
                Some(ext) => format!("{}.{}", stem, ext),
                None => stem,
            }
        })
    }

    pub fn arb_file_input() -> impl Strategy<Value = AssetFileInput> {
        (arb_file_name(), 0i32..10).prop_map(|(file_name, order)| AssetFileInput {
            file_name,
            order,
            file_type: AssetFileType::Image,
        })
    }

    /// A draft that passes validation.
    pub fn arb_valid_draft() -> impl Strategy<Value = AssetDraft> {
        (
            "[A-Za-z][A-Za-z0-9 ]{0,40}",
            "[A-Za-z0-9 .,]{0,80}",
            prop::collection::vec(arb_file_input(), 1..4),
            prop::collection::vec(arb_raw_tag(), 0..5),
        )
            .prop_map(|(name, description, files, tags)| AssetDraft {
                name,
                description,
                files,
                tags: tags.into_iter().map(|value| TagInput { value }).collect(),
            })
    }

    /// Search query parameters as `(name, value)` pairs.
    pub fn arb_query_params() -> impl Strategy<Value = Vec<(String, String)>> {
        (
            prop::option::of("[a-z]{1,8}"),
            prop::option::of("[a-z]{1,8}"),
            prop::option::of("[a-z]{1,8}"),
            1u32..=100,
            0u32..50,
        )
            .prop_map(|(name, tag, owner, limit, page)| {
                let mut params = vec![
                    ("limit".to_string(), limit.to_string()),
                    ("page".to_string(), page.to_string()),
                ];
                if let Some(name) = name {
                    params.push(("name".to_string(), name));
                }
                if let Some(tag) = tag {
                    params.push(("tag".to_string(), tag));
                }
                if let Some(owner) = owner {
                    params.push(("ownerId".to_string(), owner));
                }
                params
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built inputs for common scenarios.

    use super::*;

    pub fn alice() -> OwnerId {
        OwnerId::new("alice")
    }

    pub fn bob() -> OwnerId {
        OwnerId::new("bob")
    }

    pub fn profile(owner: &OwnerId, display_name: &str) -> OwnerProfile {
        OwnerProfile {
            id: owner.clone(),
            display_name: Some(display_name.to_string()),
            email: Some(format!("{}@example.com", owner)),
            photo_url: Some(format!("https://img.example.com/{}.png", owner)),
        }
    }

    pub fn file(name: &str) -> AssetFileInput {
        AssetFileInput {
            file_name: name.to_string(),
            order: 0,
            file_type: AssetFileType::Image,
        }
    }

    /// Draft with one file and the given raw tags.
    pub fn draft(name: &str, file_name: &str, tags: &[&str]) -> AssetDraft {
        AssetDraft {
            name: name.to_string(),
            description: String::new(),
            files: vec![file(file_name)],
            tags: tags.iter().map(|t| TagInput::from(*t)).collect(),
        }
    }

    /// `{name:"Peak", files:[{fileName:"a.jpg"}], tags:[{value:" Nature "}]}`
    pub fn peak_draft() -> AssetDraft {
        draft("Peak", "a.jpg", &[" Nature "])
    }

    pub fn rename(name: &str) -> AssetChanges {
        AssetChanges {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on catalog results.

    use super::*;

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        match result {
            Err(CatalogError::Storage(StorageError::NotFound { .. })) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_forbidden<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        match result {
            Err(CatalogError::Forbidden { .. }) => {}
            other => panic!("Expected Forbidden, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &CatalogResult<T>, field: &str) {
        match result {
            Err(CatalogError::Validation(e)) => {
                assert_eq!(e.field(), field, "Wrong field in validation error");
            }
            other => panic!("Expected Validation error on {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_storage_verification<T: std::fmt::Debug>(
        result: &CatalogResult<T>,
        file_name: &str,
    ) {
        match result {
            Err(CatalogError::StorageVerification { file_name: f, .. }) => {
                assert_eq!(f, file_name, "Wrong file in verification error");
            }
            other => panic!("Expected StorageVerification, got: {:?}", other),
        }
    }
}
