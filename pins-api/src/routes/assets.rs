//! Asset REST API Routes
//!
//! Creating and updating assets requires a bearer token; reading and
//! searching are public.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use pins_core::{AssetChanges, AssetDraft, AssetId, AssetView, Paginated, SearchQuery};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services::AssetCatalogService;
use crate::state::AppState;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::validation_failed(format!("Invalid request body: {}", e.body_text())))
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /assets - Create an asset owned by the caller
#[utoipa::path(
    post,
    path = "/assets",
    tag = "Assets",
    request_body = AssetDraft,
    responses(
        (status = 201, description = "Asset created", body = AssetView),
        (status = 400, description = "Invalid request or missing file", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 503, description = "File storage unavailable", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_asset(
    State(catalog): State<Arc<AssetCatalogService>>,
    auth: AuthExtractor,
    payload: Result<Json<AssetDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let draft = body(payload)?;
    let view = catalog.create(draft, &auth.owner_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /assets - Search assets, most recent first
#[utoipa::path(
    get,
    path = "/assets",
    tag = "Assets",
    params(SearchQuery),
    responses(
        (status = 200, description = "One page of matching assets", body = Paginated<AssetView>),
        (status = 400, description = "Invalid query", body = ApiError),
    ),
)]
pub async fn search_assets(
    State(catalog): State<Arc<AssetCatalogService>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Paginated<AssetView>>> {
    let Query(query) =
        query.map_err(|e| ApiError::validation_failed(format!("Invalid query: {}", e.body_text())))?;
    Ok(Json(catalog.search(&query).await?))
}

/// GET /assets/{id} - Fetch one asset
///
/// Counts a view unless the response is served from cache.
#[utoipa::path(
    get,
    path = "/assets/{id}",
    tag = "Assets",
    params(("id" = String, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Asset details", body = AssetView),
        (status = 404, description = "Asset not found", body = ApiError),
    ),
)]
pub async fn get_asset(
    State(catalog): State<Arc<AssetCatalogService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AssetView>> {
    Ok(Json(catalog.get_by_id(&AssetId::new(id)).await?))
}

/// PUT /assets/{id} - Update an asset the caller owns
#[utoipa::path(
    put,
    path = "/assets/{id}",
    tag = "Assets",
    params(("id" = String, Path, description = "Asset ID")),
    request_body = AssetChanges,
    responses(
        (status = 200, description = "Asset updated", body = AssetView),
        (status = 400, description = "Invalid request or missing file", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Caller does not own the asset", body = ApiError),
        (status = 404, description = "Asset not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_asset(
    State(catalog): State<Arc<AssetCatalogService>>,
    Path(id): Path<String>,
    auth: AuthExtractor,
    payload: Result<Json<AssetChanges>, JsonRejection>,
) -> ApiResult<Json<AssetView>> {
    let changes = body(payload)?;
    let view = catalog
        .update(&AssetId::new(id), changes, &auth.owner_id)
        .await?;
    Ok(Json(view))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_assets).post(create_asset))
        .route("/:id", get(get_asset).put(update_asset))
}
