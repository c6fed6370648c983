//! REST API Routes Module
//!
//! - `/assets`: asset CRUD and search
//! - `/tags`: tag ledger views (auth required)
//! - `/health`: probes (public)
//! - `/metrics` and `/openapi.json` (public)
//!
//! Authentication is resolved once, globally; handlers that need a caller ask
//! for an `AuthExtractor`.

pub mod assets;
pub mod health;
pub mod tags;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::middleware::{auth_middleware, timeout_middleware, AuthMiddlewareState, RequestTimeout};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use assets::create_router as assets_router;
pub use health::create_router as health_router;
pub use tags::create_router as tags_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if config.cors_allow_credentials {
        cors.allow_origin(origins).allow_credentials(true)
    } else {
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - answers preflight requests
/// 2. Observability - tracing span and request metrics
/// 3. Timeout - per-request deadline
/// 4. Auth - resolves the caller when a token is present
pub fn create_api_router(state: AppState, config: &ApiConfig, auth: AuthMiddlewareState) -> Router {
    Router::new()
        .nest("/assets", assets::create_router())
        .nest("/tags", tags::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .layer(from_fn_with_state(auth, auth_middleware))
        .layer(from_fn_with_state(
            RequestTimeout(config.request_timeout),
            timeout_middleware,
        ))
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
        .with_state(state)
}
