//! The filter cache seam.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;

use crate::{
    doc_set::{DocSet, WeakDocSet},
    predicate::PredicateKey,
};

/// Stores materialized positive match sets by predicate identity.
///
/// `get` returns a new handle (one more reference) that the caller drops
/// when done; `put` keeps the handle it is given.
pub trait FilterCache: Send + Sync {
    fn get(&self, key: &PredicateKey) -> Option<DocSet>;

    fn put(&self, key: PredicateKey, set: DocSet);
}

/// An unbounded [`FilterCache`] backed by a hash map.
#[derive(Default)]
pub struct InMemoryFilterCache {
    entries: Mutex<AHashMap<PredicateKey, DocSet>>,
}

impl InMemoryFilterCache {
    pub fn new() -> InMemoryFilterCache {
        Self::default()
    }

    /// Evicts an entry, handing its reference to the caller.
    pub fn remove(&self, key: &PredicateKey) -> Option<DocSet> {
        self.entries().remove(key)
    }

    /// A weak reference that does not keep the entry alive after eviction.
    pub fn get_weak(&self, key: &PredicateKey) -> Option<WeakDocSet> {
        self.entries().get(key).map(DocSet::downgrade)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries());
        drop(drained);
    }

    fn entries(&self) -> MutexGuard<'_, AHashMap<PredicateKey, DocSet>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FilterCache for InMemoryFilterCache {
    fn get(&self, key: &PredicateKey) -> Option<DocSet> {
        self.entries().get(key).cloned()
    }

    fn put(&self, key: PredicateKey, set: DocSet) {
        let previous = self.entries().insert(key, set);
        drop(previous);
    }
}

impl std::fmt::Debug for InMemoryFilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFilterCache")
            .field("len", &self.len())
            .finish()
    }
}
