//! Middleware modules for PINS API
//!
//! - `auth`: Bearer token authentication and the typed [`AuthExtractor`]
//! - `timeout`: Per-request deadline
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/assets", post(handler))
//!     // Innermost: resolves the caller, rejects bad tokens
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     // Bounds everything inside it, auth included
//!     .layer(middleware::from_fn_with_state(timeout, timeout_middleware))
//!     // Outermost
//! ```

mod auth;
mod timeout;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareError, AuthMiddlewareState};
pub use timeout::{timeout_middleware, RequestTimeout};
