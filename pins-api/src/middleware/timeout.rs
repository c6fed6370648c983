//! Request deadline.
//!
//! A request that runs past the deadline is answered with 504. Work already
//! committed by the handler is not undone.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Deadline applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

pub async fn timeout_middleware(
    State(RequestTimeout(limit)): State<RequestTimeout>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                method = %method,
                path = %path,
                timeout_ms = limit.as_millis() as u64,
                "Request timed out"
            );
            ApiError::timeout("request").into_response()
        }
    }
}
