//! Service Layer
//!
//! Business logic between the HTTP handlers and the stores. Handlers stay
//! thin: they extract, call a service, and map the result.

mod catalog;
mod enricher;

pub use catalog::*;
pub use enricher::*;
