//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use pins_storage::TagLedger;

use crate::services::AssetCatalogService;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<AssetCatalogService>,
    /// Tag endpoints read the ledger directly.
    pub ledger: Arc<TagLedger>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(catalog: Arc<AssetCatalogService>, ledger: Arc<TagLedger>) -> Self {
        Self {
            catalog,
            ledger,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<AssetCatalogService>, catalog);
crate::impl_from_ref!(Arc<TagLedger>, ledger);
crate::impl_from_ref!(Instant, start_time);
