//! In-process PINS API wired to fakes, driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use pins_api::{
    create_api_router, generate_jwt_token, ApiConfig, AppState, AssetCatalogService, AuthConfig,
    AuthMiddlewareState, JwtTokenVerifier, OwnerEnricher,
};
use pins_core::{CatalogConfig, Clock, ManualClock, OwnerId};
use pins_storage::{InMemoryAssetStore, InMemoryCacheBackend, InMemoryTagStore, ResultCache, TagLedger};
use pins_test_utils::{FakeFileStorage, FakeIdentityDirectory};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "pins_integration_test_secret";

/// A full router plus handles on every fake behind it.
pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<FakeFileStorage>,
    pub identity: Arc<FakeIdentityDirectory>,
    pub assets: Arc<InMemoryAssetStore>,
    pub tags: Arc<InMemoryTagStore>,
    pub auth: AuthConfig,
}

impl TestApp {
    pub fn new() -> Result<Self, String> {
        Self::with_api_config(ApiConfig::default())
    }

    pub fn with_api_config(api_config: ApiConfig) -> Result<Self, String> {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let storage = Arc::new(FakeFileStorage::new());
        let identity = Arc::new(FakeIdentityDirectory::new());
        let assets = Arc::new(InMemoryAssetStore::new());
        let tags = Arc::new(InMemoryTagStore::new());

        let config = CatalogConfig::default();
        let ledger = Arc::new(TagLedger::new(
            tags.clone(),
            dyn_clock.clone(),
            config.tag_retry_limit,
        ));
        let cache = Arc::new(ResultCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            dyn_clock.clone(),
        ));
        let catalog = Arc::new(AssetCatalogService::new(
            assets.clone(),
            ledger.clone(),
            cache,
            storage.clone(),
            OwnerEnricher::new(identity.clone()),
            dyn_clock.clone(),
            config,
        ));

        let auth = AuthConfig {
            clock: dyn_clock,
            ..AuthConfig::with_secret(TEST_JWT_SECRET).map_err(|e| e.to_string())?
        };
        let auth_state = AuthMiddlewareState::new(Arc::new(JwtTokenVerifier::new(auth.clone())));
        let router = create_api_router(AppState::new(catalog, ledger), &api_config, auth_state);

        Ok(Self {
            router,
            clock,
            storage,
            identity,
            assets,
            tags,
            auth,
        })
    }

    pub fn token(&self, owner: &OwnerId) -> Result<String, String> {
        generate_jwt_token(&self.auth, owner, None).map_err(|e| e.to_string())
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Send a request and return the status and raw body.
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, String), String> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).map_err(|e| e.to_string())?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| format!("Invalid UTF-8 body: {}", e))?;
        Ok((status, text))
    }

    /// Send a request and parse the body as JSON (`Null` when empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), String> {
        let (status, text) = self.send_raw(method, uri, token, body).await?;
        if text.is_empty() {
            return Ok((status, Value::Null));
        }
        let json = serde_json::from_str(&text)
            .map_err(|e| format!("Body is not JSON ({}): {}", e, text))?;
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value), String> {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value), String> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value), String> {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    /// Create an asset through the API and return its id.
    pub async fn create_asset(&self, owner: &OwnerId, body: Value) -> Result<String, String> {
        let token = self.token(owner)?;
        let (status, json) = self.post("/assets", &token, body).await?;
        if status != StatusCode::CREATED {
            return Err(format!("Create failed with {}: {}", status, json));
        }
        json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| format!("Create response has no id: {}", json))
    }
}

pub fn error_code(json: &Value) -> &str {
    json["code"].as_str().unwrap_or_default()
}
