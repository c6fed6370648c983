//! OpenAPI Specification for the PINS API
//!
//! Generated with utoipa from the route annotations and the domain types in
//! pins-core.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{assets, health, tags};
use crate::telemetry::metrics;

use pins_core::{
    AssetChanges, AssetDraft, AssetFileInput, AssetFileType, AssetFileView, AssetId, AssetTag,
    AssetView, OwnerId, OwnerProfile, Tag, TagInput,
};

/// OpenAPI document for the PINS API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PINS API",
        version = "0.2.0",
        description = "Asset sharing catalog: assets with files and tags, owner profiles, and tag popularity",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Assets", description = "Create, update, fetch and search shared assets"),
        (name = "Tags", description = "Tag popularity, prefix search and suggestions"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        // === Asset Routes ===
        assets::create_asset,
        assets::search_assets,
        assets::get_asset,
        assets::update_asset,

        // === Tag Routes ===
        tags::popular_tags,
        tags::search_tags,
        tags::suggest_tags,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,

        // === Observability ===
        metrics::metrics_handler,
    ),
    components(
        schemas(
            // === Error Types ===
            ApiError, ErrorCode,

            // === Asset Types ===
            AssetId, OwnerId, AssetDraft, AssetChanges, AssetFileInput, AssetFileType,
            AssetFileView, AssetTag, AssetView, TagInput, OwnerProfile,

            // === Tag Types ===
            Tag,

            // === Health Types ===
            health::HealthResponse, health::HealthStatus, health::HealthDetails,
            health::ComponentHealth,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by authenticated routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token; `sub` is the owner id"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
