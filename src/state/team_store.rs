use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::types::TeamKey;

// ---------------------------------------------------------------------------
// TeamStore
// ---------------------------------------------------------------------------

/// Team key -> summaries of the entities that belong to it, appended as workers
/// complete.
///
/// `append` takes the shard write lock for the key through `entry`, so
/// "bucket absent" and "push" happen under one lock: two workers racing on a new
/// team cannot both create it, and pushes to one bucket are totally ordered.
/// Order within a bucket is completion order, not ID order.
///
/// There is no read access while workers run. [`TeamStore::drain`] consumes the
/// store, so nothing can append after it.
pub struct TeamStore<S> {
    buckets: DashMap<TeamKey, Vec<S>>,
}

impl<S> TeamStore<S> {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }

    pub fn append(&self, key: TeamKey, summary: S) {
        self.buckets.entry(key).or_default().push(summary);
    }

    /// Final mapping, ordered by team key for deterministic file output.
    pub fn drain(self) -> BTreeMap<TeamKey, Vec<S>> {
        self.buckets.into_iter().collect()
    }
}

impl<S> Default for TeamStore<S> {
    fn default() -> Self {
        Self::new()
    }
}
