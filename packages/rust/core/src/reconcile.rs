//! Reconciliation sweep for items left in two collections.
//!
//! Moves are insert-then-delete, so a crash or a failed delete can leave an
//! item in both its old and new collection. The destination row is always
//! the newer one, so the sweep keeps the copy with the latest row id (UUID v7
//! ids sort by creation time) and deletes the rest. Collection precedence
//! only breaks ties.

use tracing::{info, instrument, warn};

use pressroom_shared::{ContentItem, Result, StageCollection};
use pressroom_storage::Storage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Identities found in more than one collection.
    pub conflicts: usize,
    /// Copies deleted.
    pub removed: usize,
    /// Copies that could not be deleted.
    pub failed: usize,
}

/// Resolve every cross-collection duplicate.
#[instrument(skip_all)]
pub async fn sweep(storage: &Storage) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for (identity, collections) in storage.find_cross_collection_duplicates().await? {
        let mut copies: Vec<(StageCollection, ContentItem)> = Vec::with_capacity(collections.len());
        for collection in collections {
            if let Some(copy) = storage.find_by_identity(collection, &identity).await? {
                copies.push((collection, copy));
            }
        }
        if copies.len() < 2 {
            continue;
        }
        report.conflicts += 1;

        copies.sort_by(|(ca, a), (cb, b)| {
            b.id.cmp(&a.id)
                .then_with(|| cb.precedence().cmp(&ca.precedence()))
        });
        let keep = copies[0].0;

        for (collection, stale) in copies.iter().skip(1) {
            match storage.delete_item(*collection, &stale.id).await {
                Ok(true) => {
                    info!(%identity, removed_from = %collection, kept_in = %keep, "duplicate resolved");
                    report.removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(%identity, %collection, error = %e, "failed to remove stale copy");
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}
