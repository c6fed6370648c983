//! Axum Middleware for Authentication
//!
//! Every request passes through [`auth_middleware`]:
//! - no `Authorization` header: the request continues anonymously
//! - a valid Bearer token: the caller's [`AuthContext`] is inserted into the
//!   request extensions
//! - anything else: 401, on public and protected routes alike
//!
//! Handlers that need a caller take an [`AuthExtractor`], which rejects
//! anonymous requests with 401.

use crate::auth::{extract_bearer_token, AuthContext, TokenVerifier};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for authentication middleware.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AuthMiddlewareState {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Resolve the caller from the `Authorization` header, if one is present.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let auth_header = match request.headers().get(header::AUTHORIZATION) {
        None => return Ok(next.run(request).await),
        Some(value) => value
            .to_str()
            .map_err(|_| {
                AuthMiddlewareError(ApiError::invalid_token(
                    "Authorization header is not valid text",
                ))
            })?
            .to_string(),
    };

    let token = extract_bearer_token(&auth_header).map_err(AuthMiddlewareError)?;
    let auth_context = state
        .verifier
        .verify(token)
        .await
        .map_err(AuthMiddlewareError)?;

    tracing::debug!(owner_id = %auth_context.owner_id, "Request authenticated");
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware and extractor rejections.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The authenticated caller. Rejects anonymous requests with 401.
///
/// ```rust,no_run
/// use axum::Json;
/// use pins_api::middleware::AuthExtractor;
///
/// async fn whoami(AuthExtractor(auth): AuthExtractor) -> Json<String> {
///     Json(auth.owner_id.to_string())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::unauthorized(
                    "Authentication required: provide an Authorization: Bearer token",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
