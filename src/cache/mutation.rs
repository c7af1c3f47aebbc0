//! Optimistic mutation support.
//!
//! An optimistic edit overwrites a cached payload in place and hands back
//! an `UndoToken` holding what it overwrote. Rolling the token back
//! restores exactly that snapshot; committing discards it and invalidates
//! the tags the mutation touched.

use uuid::Uuid;

use crate::cache::key::QueryKey;

/// Receipt for one optimistic edit.
///
/// A token taken against a key with no cached payload applies nothing, and
/// rolling it back restores nothing.
#[must_use = "resolve the edit by committing or rolling the token back"]
pub struct UndoToken<P> {
    pub(crate) id: Uuid,
    pub(crate) key: QueryKey,
    /// Payload as it was immediately before the edit.
    pub(crate) snapshot: Option<P>,
}

impl<P> UndoToken<P> {
    pub(crate) fn with_snapshot(key: QueryKey, previous: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            snapshot: Some(previous),
        }
    }

    pub(crate) fn noop(key: QueryKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            snapshot: None,
        }
    }

    /// Key the edit was taken against.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Whether the edit changed a cached payload.
    pub fn applied(&self) -> bool {
        self.snapshot.is_some()
    }
}
