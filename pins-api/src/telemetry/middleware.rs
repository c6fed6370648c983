//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in an `http_request` span, records Prometheus
//! request metrics, and logs completion.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info_span, Instrument};

use super::metrics::with_metrics;

// UUID pattern: 8-4-4-4-12 hex chars
static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("Invalid UUID regex")
});

static NUMERIC_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("Invalid ID regex"));

// Asset ids are opaque strings; anything directly under /assets/ is an id.
static ASSET_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/assets/[^/]+").expect("Invalid asset path regex"));

/// Normalize path for metrics/spans (replace ids with placeholders).
///
/// Keeps Prometheus label cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    let result = UUID_PATTERN.replace_all(path, "{id}");
    let result = NUMERIC_ID_PATTERN.replace_all(&result, "/{id}$1");
    let result = ASSET_ID_PATTERN.replace(&result, "/assets/{id}");
    result.to_string()
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    with_metrics(|m| {
        m.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        )
    });

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/assets/0190f3a2-7c4e-7b1a-9f00-1234567890ab";
        assert_eq!(normalize_path(path), "/assets/{id}");
    }

    #[test]
    fn test_normalize_path_opaque_asset_id() {
        assert_eq!(normalize_path("/assets/peak-42x"), "/assets/{id}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/things/12345/parts"), "/things/{id}/parts");
    }

    #[test]
    fn test_normalize_path_collection_untouched() {
        assert_eq!(normalize_path("/assets"), "/assets");
        assert_eq!(normalize_path("/assets/"), "/assets/");
        assert_eq!(normalize_path("/tags/popular"), "/tags/popular");
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
    }
}
