//! Cross-collection deduplication gate.
//!
//! An item is a duplicate when its (title, link) already appears in the
//! current batch or in any of the six stage collections. The check is
//! point-in-time; concurrent runs are caught later by the per-collection
//! unique constraint.

use std::collections::HashSet;

use tracing::debug;

use pressroom_shared::{ContentItem, IdentityKey, Result, StageCollection};
use pressroom_storage::Storage;

/// Why an item was (or was not) admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    New,
    /// Seen earlier in this batch.
    InBatch,
    /// Already stored in a collection.
    Stored(StageCollection),
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Gate for one run. New items are admitted into the batch as they pass.
pub struct DedupGate<'a> {
    storage: &'a Storage,
    batch: HashSet<IdentityKey>,
}

impl<'a> DedupGate<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            batch: HashSet::new(),
        }
    }

    /// Check `item`, admitting it into the batch when it is new.
    /// The first match short-circuits.
    pub async fn check(&mut self, item: &ContentItem) -> Result<DedupVerdict> {
        let key = item.identity();
        if self.batch.contains(&key) {
            debug!(identity = %key, "duplicate within batch");
            return Ok(DedupVerdict::InBatch);
        }

        for collection in StageCollection::ALL {
            if self.storage.contains_identity(collection, &key).await? {
                debug!(identity = %key, %collection, "duplicate in store");
                return Ok(DedupVerdict::Stored(collection));
            }
        }

        self.batch.insert(key);
        Ok(DedupVerdict::New)
    }

    pub async fn is_duplicate(&mut self, item: &ContentItem) -> Result<bool> {
        Ok(self.check(item).await?.is_duplicate())
    }

    /// Number of items admitted so far.
    pub fn admitted(&self) -> usize {
        self.batch.len()
    }
}
