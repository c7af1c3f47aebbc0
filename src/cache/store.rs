//! Entry store.
//!
//! Owns every live cache entry, keyed by query identity. Lifetime decisions
//! (when an entry appears or is removed) happen in the engine; the store
//! keeps the map and the bookkeeping honest.

use std::collections::HashMap;

use metrics::{counter, gauge};
use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::cache::key::QueryKey;

const METRIC_CACHE_ENTRIES: &str = "ricordo_cache_entries";
const METRIC_ENTRY_REMOVED: &str = "ricordo_cache_entry_removed_total";

pub(crate) struct EntryStore<A, P> {
    entries: HashMap<QueryKey, CacheEntry<A, P>>,
}

impl<A, P> EntryStore<A, P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &QueryKey) -> Option<&CacheEntry<A, P>> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &QueryKey) -> Option<&mut CacheEntry<A, P>> {
        self.entries.get_mut(key)
    }

    pub(crate) fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the entry for `key`, creating an uninitialized one on first
    /// touch. `args` only seed the entry when it is new.
    pub(crate) fn get_or_create(&mut self, key: &QueryKey, args: A) -> &mut CacheEntry<A, P> {
        let len_if_created = self.entries.len() + 1;
        self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Created cache entry");
            gauge!(METRIC_CACHE_ENTRIES).set(len_if_created as f64);
            CacheEntry::new(args)
        })
    }

    pub(crate) fn remove(
        &mut self,
        key: &QueryKey,
        reason: &'static str,
    ) -> Option<CacheEntry<A, P>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            debug!(key = %key, reason, "Removed cache entry");
            counter!(METRIC_ENTRY_REMOVED, "reason" => reason).increment(1);
            gauge!(METRIC_CACHE_ENTRIES).set(self.entries.len() as f64);
        }
        removed
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut CacheEntry<A, P>> {
        self.entries.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
