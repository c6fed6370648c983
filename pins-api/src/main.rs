//! PINS API Server Entry Point
//!
//! Reads configuration from the environment, wires the stores, cache, and
//! collaborators together, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use pins_api::telemetry::{init_tracing, TelemetryConfig};
use pins_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AssetCatalogService,
    AuthConfig, AuthMiddlewareState, CacheBackendConfig, CollaboratorConfig, Collaborators,
    DbClient, DbConfig, JwtTokenVerifier, OwnerEnricher,
};
use pins_core::{CatalogConfig, CatalogError, Clock, SystemClock};
use pins_storage::{
    AssetStore, InMemoryAssetStore, InMemoryTagStore, ResultCache, TagLedger, TagStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let catalog_config = CatalogConfig::from_env();
    catalog_config.validate().map_err(CatalogError::from)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (asset_store, tag_store) = build_stores().await?;

    let cache_backend = CacheBackendConfig::from_env()?.build()?;
    let cache = Arc::new(ResultCache::new(cache_backend, clock.clone()));
    tracing::info!(backend = cache.backend_name(), "Result cache ready");

    let collaborators = Collaborators::from_config(&CollaboratorConfig::from_env())?;
    let ledger = Arc::new(TagLedger::new(
        tag_store,
        clock.clone(),
        catalog_config.tag_retry_limit,
    ));
    let catalog = Arc::new(AssetCatalogService::new(
        asset_store,
        ledger.clone(),
        cache,
        collaborators.storage,
        OwnerEnricher::new(collaborators.identity),
        clock,
        catalog_config,
    ));

    let api_config = ApiConfig::from_env();
    let auth_state = AuthMiddlewareState::new(Arc::new(JwtTokenVerifier::new(AuthConfig::from_env())));
    let app = create_api_router(AppState::new(catalog, ledger), &api_config, auth_state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting PINS API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Postgres when `PINS_DB_HOST` is set, in-memory otherwise.
async fn build_stores() -> ApiResult<(Arc<dyn AssetStore>, Arc<dyn TagStore>)> {
    let db_config = DbConfig::from_env();
    if !db_config.is_configured() {
        tracing::warn!("PINS_DB_HOST is not set; using in-memory stores");
        return Ok((
            Arc::new(InMemoryAssetStore::new()),
            Arc::new(InMemoryTagStore::new()),
        ));
    }

    let db = DbClient::from_config(&db_config)?;
    db.ensure_schema().await?;
    tracing::info!(pool_size = db.pool_size(), "Using Postgres stores");
    Ok((Arc::new(db.clone()), Arc::new(db)))
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("PINS_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("PINS_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
