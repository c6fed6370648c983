//! Tag REST API Routes
//!
//! Read-only views over the tag ledger. All endpoints require a bearer token.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use pins_core::Tag;
use pins_storage::{
    TagLedger, DEFAULT_POPULAR_LIMIT, DEFAULT_PREFIX_LIMIT, DEFAULT_SUGGESTION_LIMIT,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;

/// Largest page any tag endpoint returns.
pub const MAX_TAG_LIMIT: usize = 100;

// ============================================================================
// QUERY TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PopularTagsQuery {
    /// Number of tags (default 20, maximum 100)
    pub limit: Option<usize>,
    /// Number of tags to skip
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TagSearchQuery {
    /// Tag prefix, matched after normalization
    pub prefix: Option<String>,
    /// Number of tags (default 10, maximum 100)
    pub limit: Option<usize>,
}

/// Parameters for `/tags/suggestions`. Only used for documentation; the
/// handler reads the raw pairs so `existingTags` can repeat.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct TagSuggestionQuery {
    /// Tags the caller already has. Repeat the parameter or separate with commas.
    pub existing_tags: Option<Vec<String>>,
    /// Number of tags (default 5, maximum 100)
    pub limit: Option<usize>,
}

impl TagSuggestionQuery {
    fn from_pairs(pairs: Vec<(String, String)>) -> ApiResult<Self> {
        let mut existing = Vec::new();
        let mut limit = None;

        for (key, value) in pairs {
            match key.as_str() {
                "existingTags" | "existingTags[]" => existing.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                ),
                "limit" => {
                    let parsed = value.trim().parse::<usize>().map_err(|_| {
                        ApiError::validation_failed(format!("Invalid limit: {}", value))
                    })?;
                    limit = Some(parsed);
                }
                _ => {}
            }
        }

        Ok(Self {
            existing_tags: Some(existing),
            limit,
        })
    }
}

fn resolve_limit(requested: Option<usize>, default: usize) -> ApiResult<usize> {
    match requested {
        None => Ok(default),
        Some(limit) if (1..=MAX_TAG_LIMIT).contains(&limit) => Ok(limit),
        Some(_) => Err(ApiError::validation_failed(format!(
            "limit must be between 1 and {}",
            MAX_TAG_LIMIT
        ))),
    }
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|e| ApiError::validation_failed(format!("Invalid query: {}", e.body_text())))
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /tags/popular - Most used tags
#[utoipa::path(
    get,
    path = "/tags/popular",
    tag = "Tags",
    params(PopularTagsQuery),
    responses(
        (status = 200, description = "Tags by usage count, highest first", body = Vec<Tag>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn popular_tags(
    State(ledger): State<Arc<TagLedger>>,
    _auth: AuthExtractor,
    params: Result<Query<PopularTagsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Tag>>> {
    let params = query(params)?;
    let limit = resolve_limit(params.limit, DEFAULT_POPULAR_LIMIT)?;
    Ok(Json(ledger.popular(limit, params.offset.unwrap_or(0)).await))
}

/// GET /tags/search - Tags starting with a prefix
#[utoipa::path(
    get,
    path = "/tags/search",
    tag = "Tags",
    params(TagSearchQuery),
    responses(
        (status = 200, description = "Matching tags in value order", body = Vec<Tag>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_tags(
    State(ledger): State<Arc<TagLedger>>,
    _auth: AuthExtractor,
    params: Result<Query<TagSearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Tag>>> {
    let params = query(params)?;
    let limit = resolve_limit(params.limit, DEFAULT_PREFIX_LIMIT)?;
    let prefix = params.prefix.unwrap_or_default();
    Ok(Json(ledger.search_by_prefix(&prefix, limit).await))
}

/// GET /tags/suggestions - Popular tags the caller does not have yet
#[utoipa::path(
    get,
    path = "/tags/suggestions",
    tag = "Tags",
    params(TagSuggestionQuery),
    responses(
        (status = 200, description = "Suggested tags", body = Vec<Tag>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn suggest_tags(
    State(ledger): State<Arc<TagLedger>>,
    _auth: AuthExtractor,
    pairs: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Json<Vec<Tag>>> {
    let params = TagSuggestionQuery::from_pairs(query(pairs)?)?;
    let limit = resolve_limit(params.limit, DEFAULT_SUGGESTION_LIMIT)?;
    let existing = params.existing_tags.unwrap_or_default();
    Ok(Json(ledger.suggest(&existing, limit).await))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/popular", get(popular_tags))
        .route("/search", get(search_tags))
        .route("/suggestions", get(suggest_tags))
}
