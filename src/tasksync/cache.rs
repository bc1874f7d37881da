//! # Local Cache
//!
//! The client's read-side source of truth: an in-memory collection of records
//! kept in insertion order, with at most one record per logical entity.
//!
//! ## Copy-on-write
//!
//! The backing `Vec` is never mutated in place. Every write builds a new
//! collection from the current snapshot and publishes it with a single
//! [`ArcSwap`] store, so readers holding an earlier snapshot keep iterating an
//! unchanged collection and never observe a half-applied write. Writers are
//! serialized by a mutex because the scan-then-swap sequence spans two steps.
//!
//! Lookups are linear scans with no secondary index. Identity comparisons go
//! through the shared [`TempIdMap`], so a record stored under its temp id is
//! found by its permanent id once the mapping is known.

use crate::id::{Id, TempIdMap};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// A record that can live in a [`Cache`].
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &Id;

    /// Soft-delete flag. Storing a deleted record evicts its entity.
    fn is_deleted(&self) -> bool;

    /// Rewrites temp ids held by the record to their permanent form.
    /// Returns whether anything changed.
    fn remap_ids(&mut self, ids: &TempIdMap) -> bool;
}

/// What a [`Cache::store`] call did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Replaced,
    /// The record was soft-deleted and its entity was evicted.
    Removed,
    /// The record was soft-deleted and its entity was not cached.
    Ignored,
}

pub struct Cache<T: Record> {
    snap: ArcSwap<Vec<T>>,
    write_lock: Mutex<()>,
    ids: Arc<TempIdMap>,
}

impl<T: Record> Cache<T> {
    pub fn new(ids: Arc<TempIdMap>) -> Self {
        Self {
            snap: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            ids,
        }
    }

    /// Inserts `record`, replacing any record for the same entity. A
    /// soft-deleted record evicts the entity instead.
    pub fn store(&self, record: T) -> StoreOutcome {
        let _guard = self.write_lock.lock();
        let current = self.snap.load_full();
        let deleted = record.is_deleted();

        let mut next = Vec::with_capacity(current.len() + 1);
        let mut slot = None;
        {
            let matcher = self.ids.matcher(record.id());
            for existing in current.iter() {
                if matcher.matches(existing.id()) {
                    slot.get_or_insert(next.len());
                } else {
                    next.push(existing.clone());
                }
            }
        }

        let outcome = match (slot, deleted) {
            (Some(_), true) => StoreOutcome::Removed,
            (Some(_), false) => StoreOutcome::Replaced,
            (None, true) => StoreOutcome::Ignored,
            (None, false) => StoreOutcome::Inserted,
        };
        if !deleted {
            // A replacement takes the slot of the entity it supersedes.
            let position = slot.unwrap_or(next.len());
            next.insert(position, record.clone());
        }

        if outcome != StoreOutcome::Ignored {
            self.snap.store(Arc::new(next));
        }
        trace!(id = %record.id(), ?outcome, "cache store");
        outcome
    }

    /// Evicts any record for the same entity as `record`. Returns whether
    /// something was removed.
    pub fn remove(&self, record: &T) -> bool {
        self.remove_id(record.id())
    }

    pub fn remove_id(&self, id: &Id) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.snap.load_full();
        let next: Vec<T> = {
            let matcher = self.ids.matcher(id);
            current
                .iter()
                .filter(|existing| !matcher.matches(existing.id()))
                .cloned()
                .collect()
        };
        let removed = next.len() != current.len();
        if removed {
            self.snap.store(Arc::new(next));
        }
        trace!(%id, removed, "cache remove");
        removed
    }

    /// The current collection. The snapshot does not change under the caller.
    pub fn get_all(&self) -> Arc<Vec<T>> {
        self.snap.load_full()
    }

    pub fn resolve(&self, id: &Id) -> Option<T> {
        let current = self.snap.load();
        let matcher = self.ids.matcher(id);
        current
            .iter()
            .find(|existing| matcher.matches(existing.id()))
            .cloned()
    }

    /// Rewrites cached temp ids whose permanent ids are now known. Returns
    /// how many records changed.
    pub fn remap_ids(&self) -> usize {
        let _guard = self.write_lock.lock();
        let current = self.snap.load_full();
        let mut changed = 0;
        let next: Vec<T> = current
            .iter()
            .map(|existing| {
                let mut record = existing.clone();
                if record.remap_ids(&self.ids) {
                    changed += 1;
                }
                record
            })
            .collect();
        if changed > 0 {
            self.snap.store(Arc::new(next));
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snap.load().is_empty()
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.snap.store(Arc::new(Vec::new()));
    }

    pub fn ids(&self) -> &Arc<TempIdMap> {
        &self.ids
    }
}
