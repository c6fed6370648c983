//! PINS API - REST Layer for the Asset Catalog
//!
//! Axum routes over the catalog service, bearer token authentication, the
//! Postgres-backed stores, HTTP collaborator clients, and telemetry. Domain
//! types live in pins-core; the in-memory stores, tag ledger, and result
//! cache live in pins-storage.

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    extract_bearer_token, generate_jwt_token, validate_jwt_token, AuthConfig, AuthContext, Claims,
    JwtSecret, JwtTokenVerifier, TokenVerifier,
};
pub use collaborators::{
    Collaborators, EmptyIdentityDirectory, HttpFileStorage, HttpIdentityDirectory,
    LocalFileStorage,
};
pub use config::{ApiConfig, CacheBackendConfig, CacheBackendKind, CollaboratorConfig};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{AssetCatalogService, OwnerEnricher};
pub use state::AppState;
