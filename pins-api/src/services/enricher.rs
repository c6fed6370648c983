//! Owner Enricher
//!
//! Attaches owner profiles to asset views with a single batched lookup.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use pins_core::{AssetView, IdentityCollaborator, OwnerId, OwnerProfile};

/// Fills `AssetView::owner` from the identity directory.
#[derive(Clone)]
pub struct OwnerEnricher {
    identity: Arc<dyn IdentityCollaborator>,
}

impl OwnerEnricher {
    pub fn new(identity: Arc<dyn IdentityCollaborator>) -> Self {
        Self { identity }
    }

    /// Attach profiles to `views`.
    ///
    /// Makes exactly one batch call for the distinct owners, or none for an
    /// empty input. If the call fails the views come back untouched; owners
    /// the directory does not know stay `None`.
    pub async fn enrich(&self, mut views: Vec<AssetView>) -> Vec<AssetView> {
        if views.is_empty() {
            return views;
        }

        let owner_ids: Vec<OwnerId> = views
            .iter()
            .map(|v| v.owner_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let profiles: HashMap<OwnerId, OwnerProfile> =
            match self.identity.get_users_batch(&owner_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
                Err(e) => {
                    tracing::warn!(
                        owners = owner_ids.len(),
                        error = %e,
                        "Owner lookup failed; returning assets without owner details"
                    );
                    return views;
                }
            };

        for view in &mut views {
            view.owner = profiles.get(&view.owner_id).cloned();
        }
        views
    }

    /// Single-view convenience over [`OwnerEnricher::enrich`].
    pub async fn enrich_one(&self, view: AssetView) -> AssetView {
        let fallback = view.clone();
        self.enrich(vec![view]).await.pop().unwrap_or(fallback)
    }
}
