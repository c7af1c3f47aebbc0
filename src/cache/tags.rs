//! Bidirectional tag index.
//!
//! Tracks the relationship between data tags and cache entries, enabling
//! efficient invalidation when a mutation reports what it changed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::cache::key::QueryKey;

/// A label linking cache entries to the domain data they carry.
///
/// A tag with an `id` names one record (`screening#4`); a tag without one
/// covers every record of the kind (`screening`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: String,
    pub id: Option<String>,
}

impl Tag {
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id.to_string()),
        }
    }

    /// A kind-wide tag matching every record of `kind`.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}#{id}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

/// Tracks tag → cache_keys and cache_key → tags mappings.
///
/// The bidirectional mapping enables:
/// - Finding all cache entries affected by an invalidated tag
/// - Cleaning up tag mappings when a cache entry is removed
///
/// Matching is deliberately asymmetric around missing ids:
/// - Invalidating `kind#id` affects entries bound to exactly `kind#id` and
///   entries bound to the kind-wide `kind` tag.
/// - Invalidating `kind` affects every entry bound to any tag of `kind`.
#[derive(Default)]
pub(crate) struct TagIndex {
    /// Maps tags to all cache keys bound to them
    tag_to_keys: HashMap<Tag, HashSet<QueryKey>>,
    /// Maps cache keys to all tags they are bound to
    key_to_tags: HashMap<QueryKey, HashSet<Tag>>,
    /// Maps tag kinds to all cache keys bound to any tag of the kind
    kind_to_keys: HashMap<String, HashSet<QueryKey>>,
}

impl TagIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds a cache key to `tags`, replacing any previous binding.
    ///
    /// Rebinding on every applied payload keeps the index an exact mirror
    /// of what each live entry currently provides.
    pub(crate) fn bind(&mut self, key: &QueryKey, tags: &[Tag]) {
        self.unbind(key);

        let mut bound = HashSet::with_capacity(tags.len());
        for tag in tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
            self.kind_to_keys
                .entry(tag.kind.clone())
                .or_default()
                .insert(key.clone());
            bound.insert(tag.clone());
        }

        if !bound.is_empty() {
            self.key_to_tags.insert(key.clone(), bound);
        }
    }

    /// Removes a cache key and cleans up tag mappings.
    ///
    /// Called when a cache entry is removed or its tags are replaced.
    pub(crate) fn unbind(&mut self, key: &QueryKey) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };

        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
            if let Some(keys) = self.kind_to_keys.get_mut(&tag.kind) {
                keys.remove(key);
                if keys.is_empty() {
                    self.kind_to_keys.remove(&tag.kind);
                }
            }
        }
    }

    /// All cache keys affected by invalidating `tag`.
    pub(crate) fn keys_for(&self, tag: &Tag) -> HashSet<QueryKey> {
        match tag.id {
            Some(_) => {
                let mut keys = self
                    .tag_to_keys
                    .get(tag)
                    .cloned()
                    .unwrap_or_default();
                if let Some(wide) = self.tag_to_keys.get(&Tag::kind(tag.kind.clone())) {
                    keys.extend(wide.iter().cloned());
                }
                keys
            }
            None => self
                .kind_to_keys
                .get(&tag.kind)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Number of distinct tags currently bound.
    pub(crate) fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    /// Number of cache keys currently bound to at least one tag.
    pub(crate) fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }
}
