//! Subscription accounting.
//!
//! Tracks which subscribers watch which keys. The counts kept here drive
//! entry retention: the last unsubscribe from a key starts the removal
//! grace timer, and the next subscribe cancels it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::key::QueryKey;
use crate::cache::view::QueryView;

/// Callback invoked with a fresh view whenever a subscriber's view changes.
///
/// Listeners run synchronously on the thread that caused the change, after
/// engine state is settled. They receive the view by value and must not
/// block.
pub type Listener<P> = Arc<dyn Fn(QueryView<P>) + Send + Sync>;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-subscription knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Re-issue the query this often while subscribed. Floored to the
    /// engine's configured minimum.
    pub poll_interval: Option<Duration>,
}

impl SubscribeOptions {
    pub fn polling(every: Duration) -> Self {
        Self {
            poll_interval: Some(every),
        }
    }
}

/// A subscriber's poll loop.
pub(crate) struct PollTask {
    pub(crate) every: Duration,
    pub(crate) handle: JoinHandle<()>,
}

pub(crate) struct SubscriberState<P> {
    /// Key the subscriber currently watches.
    pub(crate) key: QueryKey,
    /// Last payload this subscriber was shown. Feeds the view fallback
    /// while a different key is loading.
    pub(crate) sticky: Option<P>,
    pub(crate) listener: Listener<P>,
    /// Last dispatched view; changes are only dispatched when the
    /// projection differs from this.
    pub(crate) last_view: Option<QueryView<P>>,
    pub(crate) poll: Option<PollTask>,
}

/// Subscriber bookkeeping for one engine.
pub(crate) struct SubscriptionManager<P> {
    subscribers: HashMap<SubscriberId, SubscriberState<P>>,
    by_key: HashMap<QueryKey, HashSet<SubscriberId>>,
}

impl<P> SubscriptionManager<P> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            by_key: HashMap::new(),
        }
    }

    /// Registers a subscriber. Returns how many subscribers its key has
    /// after insertion.
    pub(crate) fn insert(&mut self, id: SubscriberId, state: SubscriberState<P>) -> usize {
        let key = state.key.clone();
        self.subscribers.insert(id, state);
        let ids = self.by_key.entry(key).or_default();
        ids.insert(id);
        ids.len()
    }

    pub(crate) fn get(&self, id: SubscriberId) -> Option<&SubscriberState<P>> {
        self.subscribers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: SubscriberId) -> Option<&mut SubscriberState<P>> {
        self.subscribers.get_mut(&id)
    }

    /// Moves a subscriber to `new_key`. Returns the key it left and how
    /// many subscribers remain there.
    pub(crate) fn rebind(
        &mut self,
        id: SubscriberId,
        new_key: QueryKey,
    ) -> Option<(QueryKey, usize)> {
        let state = self.subscribers.get_mut(&id)?;
        let old_key = std::mem::replace(&mut state.key, new_key.clone());

        let remaining = match self.by_key.get_mut(&old_key) {
            Some(ids) => {
                ids.remove(&id);
                let remaining = ids.len();
                if ids.is_empty() {
                    self.by_key.remove(&old_key);
                }
                remaining
            }
            None => 0,
        };
        self.by_key.entry(new_key).or_default().insert(id);

        Some((old_key, remaining))
    }

    /// Removes a subscriber. Returns its state and how many subscribers
    /// remain on its key.
    pub(crate) fn remove(&mut self, id: SubscriberId) -> Option<(SubscriberState<P>, usize)> {
        let state = self.subscribers.remove(&id)?;

        let remaining = match self.by_key.get_mut(&state.key) {
            Some(ids) => {
                ids.remove(&id);
                let remaining = ids.len();
                if ids.is_empty() {
                    self.by_key.remove(&state.key);
                }
                remaining
            }
            None => 0,
        };

        Some((state, remaining))
    }

    pub(crate) fn count_for(&self, key: &QueryKey) -> usize {
        self.by_key.get(key).map_or(0, HashSet::len)
    }

    pub(crate) fn ids_for(&self, key: &QueryKey) -> Vec<SubscriberId> {
        self.by_key
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn states_mut(&mut self) -> impl Iterator<Item = &mut SubscriberState<P>> {
        self.subscribers.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
