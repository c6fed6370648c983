//! Collaborator adapters
//!
//! HTTP clients for the object storage and identity services, plus local
//! stand-ins used when those services are not configured.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pins_core::{
    storage_path, CatalogError, CatalogResult, IdentityCollaborator, OwnerId, OwnerProfile,
    StorageCollaborator,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::CollaboratorConfig;
use crate::error::{ApiError, ApiResult};

const STORAGE_SERVICE: &str = "storage";
const IDENTITY_SERVICE: &str = "identity";

/// Failure talking to a collaborator service.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    fn into_catalog(self, service: &str) -> CatalogError {
        CatalogError::Collaborator {
            service: service.to_string(),
            reason: self.to_string(),
        }
    }
}

fn build_client(config: &CollaboratorConfig) -> ApiResult<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))
}

// ============================================================================
// STORAGE
// ============================================================================

/// Object storage reached over HTTP. A file exists when
/// `HEAD {base}/users/{owner}/{file}` answers 2xx.
#[derive(Debug, Clone)]
pub struct HttpFileStorage {
    client: Client,
    base_url: String,
}

impl HttpFileStorage {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn head(&self, owner_id: &OwnerId, file_name: &str) -> Result<bool, CollaboratorError> {
        let url = format!("{}/{}", self.base_url, storage_path(owner_id, file_name));
        let response = self.client.head(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl StorageCollaborator for HttpFileStorage {
    async fn file_exists(&self, owner_id: &OwnerId, file_name: &str) -> CatalogResult<bool> {
        self.head(owner_id, file_name).await.map_err(|e| {
            tracing::warn!(owner_id = %owner_id, file_name, error = %e, "File check failed");
            e.into_catalog(STORAGE_SERVICE)
        })
    }
}

/// Files laid out under a local directory as `users/{owner}/{file}`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, owner_id: &OwnerId, file_name: &str) -> Option<PathBuf> {
        // keep lookups inside the root
        let unsafe_segment = |s: &str| s.is_empty() || s == ".." || s.contains(['/', '\\']);
        if unsafe_segment(owner_id.as_str()) || unsafe_segment(file_name) {
            return None;
        }
        Some(
            self.root
                .join("users")
                .join(owner_id.as_str())
                .join(file_name),
        )
    }
}

#[async_trait]
impl StorageCollaborator for LocalFileStorage {
    async fn file_exists(&self, owner_id: &OwnerId, file_name: &str) -> CatalogResult<bool> {
        let Some(path) = self.path_of(owner_id, file_name) else {
            return Ok(false);
        };
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CollaboratorError::from(e).into_catalog(STORAGE_SERVICE))
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchGetRequest<'a> {
    ids: &'a [OwnerId],
}

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    users: Vec<OwnerProfile>,
}

/// User directory reached over HTTP via `POST {base}/users:batchGet`.
#[derive(Debug, Clone)]
pub struct HttpIdentityDirectory {
    client: Client,
    base_url: String,
}

impl HttpIdentityDirectory {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn batch_get(&self, ids: &[OwnerId]) -> Result<Vec<OwnerProfile>, CollaboratorError> {
        let url = format!("{}/users:batchGet", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&BatchGetRequest { ids })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<BatchGetResponse>().await?.users)
    }
}

#[async_trait]
impl IdentityCollaborator for HttpIdentityDirectory {
    async fn get_users_batch(&self, ids: &[OwnerId]) -> CatalogResult<Vec<OwnerProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.batch_get(ids)
            .await
            .map_err(|e| e.into_catalog(IDENTITY_SERVICE))
    }
}

/// Directory that knows nobody. Owners stay unenriched.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyIdentityDirectory;

#[async_trait]
impl IdentityCollaborator for EmptyIdentityDirectory {
    async fn get_users_batch(&self, _ids: &[OwnerId]) -> CatalogResult<Vec<OwnerProfile>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// WIRING
// ============================================================================

/// The storage and identity collaborators selected by configuration.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageCollaborator>,
    pub identity: Arc<dyn IdentityCollaborator>,
}

impl Collaborators {
    pub fn from_config(config: &CollaboratorConfig) -> ApiResult<Self> {
        let needs_client = config.storage_base_url.is_some() || config.identity_base_url.is_some();
        let client = if needs_client {
            Some(build_client(config)?)
        } else {
            None
        };

        let storage: Arc<dyn StorageCollaborator> =
            match (&config.storage_base_url, client.clone()) {
                (Some(base), Some(client)) => {
                    tracing::info!(base_url = %base, "Using HTTP file storage");
                    Arc::new(HttpFileStorage::new(client, base.as_str()))
                }
                _ => {
                    tracing::info!(root = %config.storage_root.display(), "Using local file storage");
                    Arc::new(LocalFileStorage::new(config.storage_root.clone()))
                }
            };

        let identity: Arc<dyn IdentityCollaborator> = match (&config.identity_base_url, client) {
            (Some(base), Some(client)) => {
                tracing::info!(base_url = %base, "Using HTTP identity directory");
                Arc::new(HttpIdentityDirectory::new(client, base.as_str()))
            }
            _ => {
                tracing::warn!("No identity service configured; owners will not be enriched");
                Arc::new(EmptyIdentityDirectory)
            }
        };

        Ok(Self { storage, identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode as AxumStatus,
        routing::head,
        Json, Router,
    };
    use std::time::Duration;

    async fn spawn(app: Router) -> Result<String, String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| e.to_string())?;
        let addr = listener.local_addr().map_err(|e| e.to_string())?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{}", addr))
    }

    fn client() -> Result<Client, String> {
        Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_local_storage_checks_owner_directory() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let owner_dir = dir.path().join("users").join("alice");
        std::fs::create_dir_all(&owner_dir).map_err(|e| e.to_string())?;
        std::fs::write(owner_dir.join("a.jpg"), b"jpeg").map_err(|e| e.to_string())?;

        let storage = LocalFileStorage::new(dir.path());
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");

        assert_eq!(storage.file_exists(&alice, "a.jpg").await, Ok(true));
        assert_eq!(storage.file_exists(&alice, "b.jpg").await, Ok(false));
        assert_eq!(storage.file_exists(&bob, "a.jpg").await, Ok(false));
        Ok(())
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        std::fs::write(dir.path().join("secret.txt"), b"x").map_err(|e| e.to_string())?;

        let storage = LocalFileStorage::new(dir.path().join("nested"));
        let owner = OwnerId::new("..");
        assert_eq!(storage.file_exists(&owner, "secret.txt").await, Ok(false));
        assert_eq!(
            storage
                .file_exists(&OwnerId::new("alice"), "../../secret.txt")
                .await,
            Ok(false)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_http_storage_maps_statuses() -> Result<(), String> {
        let app = Router::new().route(
            "/users/:owner/:file",
            head(|Path((owner, file)): Path<(String, String)>| async move {
                match (owner.as_str(), file.as_str()) {
                    ("alice", "a.jpg") => AxumStatus::OK,
                    ("alice", "broken.jpg") => AxumStatus::INTERNAL_SERVER_ERROR,
                    _ => AxumStatus::NOT_FOUND,
                }
            }),
        );
        let base = spawn(app).await?;
        let storage = HttpFileStorage::new(client()?, format!("{}/", base));
        let alice = OwnerId::new("alice");

        assert_eq!(storage.file_exists(&alice, "a.jpg").await, Ok(true));
        assert_eq!(storage.file_exists(&alice, "missing.jpg").await, Ok(false));
        assert!(matches!(
            storage.file_exists(&alice, "broken.jpg").await,
            Err(CatalogError::Collaborator { ref service, .. }) if service == "storage"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_identity_batch() -> Result<(), String> {
        // fallback keeps the colon out of the route table
        let app = Router::new().fallback(
            |Json(body): Json<serde_json::Value>| async move {
                let users: Vec<serde_json::Value> = body["ids"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|id| id != "ghost")
                    .map(|id| serde_json::json!({"id": id, "displayName": "Someone"}))
                    .collect();
                Json(serde_json::json!({ "users": users }))
            },
        );
        let base = spawn(app).await?;
        let directory = HttpIdentityDirectory::new(client()?, base);

        let profiles = directory
            .get_users_batch(&[OwnerId::new("alice"), OwnerId::new("ghost")])
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, OwnerId::new("alice"));
        assert_eq!(profiles[0].display_name.as_deref(), Some("Someone"));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_identity_failure_is_collaborator_error() -> Result<(), String> {
        let app = Router::new().fallback(|| async { AxumStatus::SERVICE_UNAVAILABLE });
        let base = spawn(app).await?;
        let directory = HttpIdentityDirectory::new(client()?, base);

        let result = directory.get_users_batch(&[OwnerId::new("alice")]).await;
        assert!(matches!(
            result,
            Err(CatalogError::Collaborator { ref service, .. }) if service == "identity"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_local() -> Result<(), String> {
        let collaborators =
            Collaborators::from_config(&CollaboratorConfig::default()).map_err(|e| e.message)?;
        let profiles = collaborators
            .identity
            .get_users_batch(&[OwnerId::new("alice")])
            .await
            .map_err(|e| e.to_string())?;
        assert!(profiles.is_empty());
        Ok(())
    }
}
