//! The query cache engine.
//!
//! Coordinates the other cache modules behind one state lock: entries,
//! subscriber accounting, the tag index, fetch issuance, and scheduled
//! removal. Fetches and timers run on spawned tasks that hold only a weak
//! handle to the engine; listener callbacks always run after the state
//! lock is released.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::config::EngineConfig;
use crate::cache::entry::{QueryStatus, RemovalTimer};
use crate::cache::fetch::{self, RequestId};
use crate::cache::key::QueryKey;
use crate::cache::lock::mutex_lock;
use crate::cache::mutation::UndoToken;
use crate::cache::store::EntryStore;
use crate::cache::subscription::{
    Listener, PollTask, SubscribeOptions, SubscriberId, SubscriberState, SubscriptionManager,
};
use crate::cache::tags::{Tag, TagIndex};
use crate::cache::view::QueryView;
use crate::domain::error::FetchError;
use crate::source::QuerySource;

const SOURCE: &str = "cache::engine";

const METRIC_FETCH_STARTED: &str = "ricordo_fetch_started_total";
const METRIC_FETCH_APPLIED: &str = "ricordo_fetch_applied_total";
const METRIC_FETCH_SUPERSEDED: &str = "ricordo_fetch_superseded_total";
const METRIC_FETCH_FAILED: &str = "ricordo_fetch_failed_total";
const METRIC_FETCH_DURATION_MS: &str = "ricordo_fetch_duration_ms";
const METRIC_REMOVAL_CANCELLED: &str = "ricordo_cache_removal_cancelled_total";
const METRIC_INVALIDATION_REFETCH: &str = "ricordo_invalidation_refetch_total";
const METRIC_INVALIDATION_DEFERRED: &str = "ricordo_invalidation_deferred_total";
const METRIC_MUTATION_OPTIMISTIC: &str = "ricordo_mutation_optimistic_total";
const METRIC_MUTATION_ROLLBACK: &str = "ricordo_mutation_rollback_total";

/// Derives a query's cache identity from its arguments.
pub type KeyFn<A> = Arc<dyn Fn(&A) -> QueryKey + Send + Sync>;
/// Derives the tags a fetched payload provides.
pub type TagsFn<A, P> = Arc<dyn Fn(&A, &P) -> Vec<Tag> + Send + Sync>;

/// Everything guarded by the engine's one lock.
struct EngineState<A, P> {
    entries: EntryStore<A, P>,
    subscribers: SubscriptionManager<P>,
    tags: TagIndex,
}

/// Queued listener calls, collected under the lock and run after it.
type Dispatches<P> = Vec<(Listener<P>, QueryView<P>)>;

impl<A, P> EngineState<A, P>
where
    P: Clone + PartialEq,
{
    /// Reprojects the view of every subscriber on `key`, queueing a
    /// dispatch for each one that changed.
    fn refresh_key(&mut self, key: &QueryKey, out: &mut Dispatches<P>) {
        for id in self.subscribers.ids_for(key) {
            self.refresh_subscriber(id, out);
        }
    }

    fn refresh_subscriber(&mut self, id: SubscriberId, out: &mut Dispatches<P>) {
        let Some(sub) = self.subscribers.get_mut(id) else {
            return;
        };
        let view = project_for(&self.entries, sub);
        if sub.last_view.as_ref() == Some(&view) {
            return;
        }
        sub.last_view = Some(view.clone());
        out.push((Arc::clone(&sub.listener), view));
    }
}

/// Projects `sub`'s view and advances its sticky payload to whatever the
/// view shows.
fn project_for<A, P: Clone>(
    entries: &EntryStore<A, P>,
    sub: &mut SubscriberState<P>,
) -> QueryView<P> {
    let view = match entries.get(&sub.key) {
        Some(entry) => QueryView::project(entry, sub.sticky.as_ref()),
        None => QueryView::detached(sub.sticky.as_ref()),
    };
    if view.data.is_some() {
        sub.sticky = view.data.clone();
    }
    view
}

struct EngineInner<A, P> {
    config: EngineConfig,
    source: Arc<dyn QuerySource<A, P>>,
    key_fn: KeyFn<A>,
    tags_fn: TagsFn<A, P>,
    state: Mutex<EngineState<A, P>>,
    /// Monotonic request ids. Later ids always win.
    next_request: AtomicU64,
    /// Epochs for removal timers. A timer only fires while its epoch is
    /// still the one recorded on the entry.
    next_epoch: AtomicU64,
}

impl<A, P> EngineInner<A, P> {
    fn lock_state(&self, op: &'static str) -> MutexGuard<'_, EngineState<A, P>> {
        mutex_lock(&self.state, SOURCE, op)
    }
}

impl<A, P> Drop for EngineInner<A, P> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for entry in state.entries.values_mut() {
            entry.cancel_removal();
        }
        for sub in state.subscribers.states_mut() {
            if let Some(poll) = sub.poll.take() {
                poll.handle.abort();
            }
        }
    }
}

/// An argument-keyed query cache.
///
/// One engine serves one query shape: `A` arguments resolve to `P` payloads
/// through the engine's `QuerySource`. Identity and tagging are explicit,
/// supplied as functions at construction. The handle is cheap to clone and
/// every clone drives the same cache.
pub struct QueryCacheEngine<A, P> {
    inner: Arc<EngineInner<A, P>>,
}

impl<A, P> Clone for QueryCacheEngine<A, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, P> QueryCacheEngine<A, P>
where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn QuerySource<A, P>>,
        key_fn: impl Fn(&A) -> QueryKey + Send + Sync + 'static,
        tags_fn: impl Fn(&A, &P) -> Vec<Tag> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                source,
                key_fn: Arc::new(key_fn),
                tags_fn: Arc::new(tags_fn),
                state: Mutex::new(EngineState {
                    entries: EntryStore::new(),
                    subscribers: SubscriptionManager::new(),
                    tags: TagIndex::new(),
                }),
                next_request: AtomicU64::new(0),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a subscriber for `args` and synchronously dispatches its
    /// first view.
    ///
    /// First touch of a key issues a fetch; while one is already in flight
    /// the subscriber shares it, and a fulfilled entry is reused without
    /// going upstream.
    pub fn subscribe(
        &self,
        args: A,
        options: SubscribeOptions,
        listener: impl Fn(QueryView<P>) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = SubscriberId::new();
        let key = (self.inner.key_fn)(&args);
        let mut pending = Vec::new();
        {
            let mut state = self.inner.lock_state("subscribe");
            touch_entry(&mut state, &key, args);

            let count = state.subscribers.insert(
                id,
                SubscriberState {
                    key: key.clone(),
                    sticky: None,
                    listener: Arc::new(listener),
                    last_view: None,
                    poll: None,
                },
            );

            ensure_fetch(&self.inner, &mut state, &key, false);
            state.refresh_subscriber(id, &mut pending);

            if let Some(every) = options.poll_interval {
                let every = self.inner.config.clamp_poll_interval(every);
                let handle = spawn_poll(&self.inner, id, every);
                if let Some(sub) = state.subscribers.get_mut(id) {
                    sub.poll = Some(PollTask { every, handle });
                }
            }

            info!(subscriber = %id, key = %key, subscribers = count, "Subscribed");
        }
        dispatch(pending);
        id
    }

    /// Moves a subscriber to new arguments.
    ///
    /// Same-key rebinds only update the stored arguments. A key change
    /// leaves the old entry (starting its removal clock when the subscriber
    /// was the last one) and touches the new key like a fresh subscribe,
    /// with the subscriber's sticky payload carried along.
    pub fn rebind(&self, id: SubscriberId, args: A) {
        let new_key = (self.inner.key_fn)(&args);
        let mut pending = Vec::new();
        {
            let mut state = self.inner.lock_state("rebind");
            let Some(sub) = state.subscribers.get(id) else {
                debug!(subscriber = %id, "Rebind for unknown subscriber");
                return;
            };

            if sub.key == new_key {
                if let Some(entry) = state.entries.get_mut(&new_key) {
                    entry.last_args = args;
                }
                return;
            }

            let Some((old_key, remaining_old)) = state.subscribers.rebind(id, new_key.clone())
            else {
                return;
            };

            touch_entry(&mut state, &new_key, args);
            ensure_fetch(&self.inner, &mut state, &new_key, false);
            state.refresh_subscriber(id, &mut pending);

            if remaining_old == 0 && state.entries.contains(&old_key) {
                schedule_removal(&self.inner, &mut state, &old_key);
            }

            info!(subscriber = %id, from = %old_key, to = %new_key, "Rebound subscriber");
        }
        dispatch(pending);
    }

    /// Drops a subscription. The last subscriber leaving a key starts the
    /// entry's removal grace timer.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut state = self.inner.lock_state("unsubscribe");
        let Some((sub, remaining)) = state.subscribers.remove(id) else {
            debug!(subscriber = %id, "Unsubscribe for unknown subscriber");
            return;
        };
        if let Some(poll) = sub.poll {
            poll.handle.abort();
        }
        if remaining == 0 && state.entries.contains(&sub.key) {
            schedule_removal(&self.inner, &mut state, &sub.key);
        }
        info!(subscriber = %id, key = %sub.key, remaining, "Unsubscribed");
    }

    /// Forces a fetch for the subscriber's current key, superseding any
    /// in-flight request.
    pub fn refetch(&self, id: SubscriberId) {
        refetch_subscriber(&self.inner, id, "manual");
    }

    /// The subscriber's current view, as last dispatched.
    pub fn view(&self, id: SubscriberId) -> Option<QueryView<P>> {
        let state = self.inner.lock_state("view");
        state.subscribers.get(id).and_then(|sub| sub.last_view.clone())
    }

    /// Invalidates every entry matching any of `tags`.
    ///
    /// Entries with live subscribers refetch immediately; entries without
    /// any are marked so their next touch refetches.
    pub fn invalidate(&self, tags: &[Tag]) {
        let mut pending = Vec::new();
        {
            let mut state = self.inner.lock_state("invalidate");
            let mut keys: HashSet<QueryKey> = HashSet::new();
            for tag in tags {
                keys.extend(state.tags.keys_for(tag));
            }
            let touched = keys.len();

            for key in keys {
                if state.subscribers.count_for(&key) > 0 {
                    counter!(METRIC_INVALIDATION_REFETCH).increment(1);
                    debug!(key = %key, "Invalidated entry with live subscribers; refetching");
                    ensure_fetch(&self.inner, &mut state, &key, true);
                    state.refresh_key(&key, &mut pending);
                } else if let Some(entry) = state.entries.get_mut(&key) {
                    entry.needs_refetch = true;
                    counter!(METRIC_INVALIDATION_DEFERRED).increment(1);
                    debug!(key = %key, "Invalidated idle entry; marked for deferred refetch");
                }
            }

            let rendered = tags
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            info!(tags = %rendered, touched, "Applied invalidation");
        }
        dispatch(pending);
    }

    /// Invalidates every entry carrying any tag of `kind`.
    pub fn invalidate_kind(&self, kind: &str) {
        self.invalidate(&[Tag::kind(kind)]);
    }

    /// Edits the cached payload for `args` in place, returning a token that
    /// can restore what the edit overwrote.
    ///
    /// When the key has no cached payload the edit does not run and the
    /// token is a no-op.
    pub fn apply_optimistic(&self, args: &A, edit: impl FnOnce(&mut P)) -> UndoToken<P> {
        let key = (self.inner.key_fn)(args);
        let mut pending = Vec::new();
        let token;
        {
            let mut state = self.inner.lock_state("apply_optimistic");
            token = match state.entries.get_mut(&key).and_then(|e| e.data.as_mut()) {
                Some(data) => {
                    let snapshot = data.clone();
                    edit(data);
                    counter!(METRIC_MUTATION_OPTIMISTIC).increment(1);
                    debug!(key = %key, "Applied optimistic edit");
                    UndoToken::with_snapshot(key.clone(), snapshot)
                }
                None => {
                    debug!(key = %key, "Optimistic edit found no payload; nothing applied");
                    UndoToken::noop(key.clone())
                }
            };
            state.refresh_key(&key, &mut pending);
        }
        dispatch(pending);
        token
    }

    /// Resolves an optimistic edit whose upstream write succeeded: the
    /// snapshot is discarded and `tags` are invalidated so affected entries
    /// converge on what the upstream now holds.
    pub fn commit(&self, token: UndoToken<P>, tags: &[Tag]) {
        info!(mutation = %token.id, key = %token.key, "Committed mutation");
        drop(token);
        self.invalidate(tags);
    }

    /// Resolves a failed optimistic edit by restoring the snapshot the edit
    /// overwrote. A no-op token restores nothing.
    pub fn rollback(&self, token: UndoToken<P>) {
        let UndoToken { id, key, snapshot } = token;
        let Some(snapshot) = snapshot else {
            debug!(mutation = %id, key = %key, "Rollback of a no-op edit");
            return;
        };
        let mut pending = Vec::new();
        {
            let mut state = self.inner.lock_state("rollback");
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.data = Some(snapshot);
                    counter!(METRIC_MUTATION_ROLLBACK).increment(1);
                    info!(mutation = %id, key = %key, "Rolled back optimistic edit");
                }
                None => {
                    debug!(mutation = %id, key = %key, "Rollback target no longer cached");
                }
            }
            state.refresh_key(&key, &mut pending);
        }
        dispatch(pending);
    }

    /// Number of live cache entries.
    pub fn entry_count(&self) -> usize {
        self.inner.lock_state("entry_count").entries.len()
    }

    /// Number of live subscriptions across all keys.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state("subscriber_count").subscribers.len()
    }
}

/// Creates or reuses the entry for `key` and records `args` as its latest,
/// cancelling any scheduled removal.
fn touch_entry<A, P>(state: &mut EngineState<A, P>, key: &QueryKey, args: A)
where
    A: Clone,
{
    let entry = state.entries.get_or_create(key, args.clone());
    entry.last_args = args;
    if entry.cancel_removal() {
        counter!(METRIC_REMOVAL_CANCELLED).increment(1);
        debug!(key = %key, "Cancelled scheduled removal");
    }
}

/// Plans a fetch for `key` and issues it when the plan says so.
fn ensure_fetch<A, P>(
    inner: &Arc<EngineInner<A, P>>,
    state: &mut EngineState<A, P>,
    key: &QueryKey,
    force: bool,
) where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let Some(entry) = state.entries.get_mut(key) else {
        return;
    };

    if !fetch::plan(entry.status, entry.needs_refetch, force).should_issue() {
        debug!(key = %key, status = entry.status.as_str(), "Reusing cache entry");
        return;
    }

    let request = inner.next_request.fetch_add(1, Ordering::Relaxed) + 1;
    let superseding = entry.status == QueryStatus::Pending;
    entry.begin_request(request);
    let args = entry.last_args.clone();

    counter!(METRIC_FETCH_STARTED).increment(1);
    debug!(key = %key, request, superseding, "Issued fetch");
    spawn_fetch(inner, key.clone(), request, args);
}

fn spawn_fetch<A, P>(inner: &Arc<EngineInner<A, P>>, key: QueryKey, request: RequestId, args: A)
where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let weak = Arc::downgrade(inner);
    let source = Arc::clone(&inner.source);
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        let result = source.fetch(&args).await;
        histogram!(METRIC_FETCH_DURATION_MS)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        // The engine may be gone by the time the source answers.
        let Some(inner) = weak.upgrade() else {
            return;
        };
        complete_fetch(&inner, key, request, args, result);
    });
}

/// Lands one request's result: applies it when the request is still the
/// entry's latest, refreshes affected views, and keeps retention honest.
fn complete_fetch<A, P>(
    inner: &Arc<EngineInner<A, P>>,
    key: QueryKey,
    request: RequestId,
    args: A,
    result: Result<P, FetchError>,
) where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let mut pending = Vec::new();
    {
        let mut state = inner.lock_state("complete_fetch");

        match state.entries.get(&key) {
            Some(entry) if !entry.accepts(request) => {
                counter!(METRIC_FETCH_SUPERSEDED).increment(1);
                debug!(key = %key, request, "Discarded superseded fetch result");
                return;
            }
            Some(_) => {}
            None if result.is_err() => {
                debug!(key = %key, request, "Discarded late failure for expired entry");
                return;
            }
            None => {
                // A success landed after the grace timer removed the entry.
                // The payload is still the freshest known; revive the entry
                // and restart its unused-entry clock below.
                let entry = state.entries.get_or_create(&key, args);
                entry.begin_request(request);
                debug!(key = %key, request, "Revived expired entry for a late result");
            }
        }

        match result {
            Ok(payload) => {
                let Some(entry) = state.entries.get_mut(&key) else {
                    return;
                };
                let tags = (inner.tags_fn)(&entry.last_args, &payload);
                entry.apply_success(payload);
                entry.tags = tags.clone();
                state.tags.bind(&key, &tags);
                counter!(METRIC_FETCH_APPLIED).increment(1);
                debug!(key = %key, request, tags = tags.len(), "Fetch fulfilled");
            }
            Err(error) => {
                let Some(entry) = state.entries.get_mut(&key) else {
                    return;
                };
                warn!(
                    key = %key,
                    request,
                    kind = %error.kind,
                    error = %error.message,
                    "Fetch failed"
                );
                counter!(METRIC_FETCH_FAILED).increment(1);
                entry.apply_failure(error);
            }
        }

        state.refresh_key(&key, &mut pending);

        if state.subscribers.count_for(&key) == 0 {
            let needs_timer = state
                .entries
                .get(&key)
                .is_some_and(|entry| entry.removal.is_none());
            if needs_timer {
                schedule_removal(inner, &mut state, &key);
            }
        }
    }
    dispatch(pending);
}

/// Starts the grace timer that removes `key` once nobody subscribes to it.
fn schedule_removal<A, P>(
    inner: &Arc<EngineInner<A, P>>,
    state: &mut EngineState<A, P>,
    key: &QueryKey,
) where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let epoch = inner.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
    let grace = inner.config.unused_entry_grace();
    let weak = Arc::downgrade(inner);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        finish_removal(&inner, task_key, epoch);
    });

    match state.entries.get_mut(key) {
        Some(entry) => {
            entry.cancel_removal();
            entry.removal = Some(RemovalTimer { epoch, handle });
            debug!(key = %key, grace_ms = grace.as_millis() as u64, "Scheduled entry removal");
        }
        None => handle.abort(),
    }
}

fn finish_removal<A, P>(inner: &Arc<EngineInner<A, P>>, key: QueryKey, epoch: u64) {
    let mut state = inner.lock_state("finish_removal");
    let Some(entry) = state.entries.get(&key) else {
        return;
    };
    // A cancel may lose the race with a timer that is already past its
    // sleep. The epoch recorded on the entry is the tiebreaker.
    if entry.removal.as_ref().map(|timer| timer.epoch) != Some(epoch) {
        return;
    }
    state.entries.remove(&key, "expired");
    state.tags.unbind(&key);
}

fn refetch_subscriber<A, P>(
    inner: &Arc<EngineInner<A, P>>,
    id: SubscriberId,
    reason: &'static str,
) -> bool
where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let mut pending = Vec::new();
    {
        let mut state = inner.lock_state("refetch");
        let Some(sub) = state.subscribers.get(id) else {
            debug!(subscriber = %id, reason, "Refetch for unknown subscriber");
            return false;
        };
        let key = sub.key.clone();
        debug!(subscriber = %id, key = %key, reason, "Forcing refetch");
        ensure_fetch(inner, &mut state, &key, true);
        state.refresh_key(&key, &mut pending);
    }
    dispatch(pending);
    true
}

fn spawn_poll<A, P>(
    inner: &Arc<EngineInner<A, P>>,
    id: SubscriberId,
    every: Duration,
) -> JoinHandle<()>
where
    A: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the subscribe that started
        // this loop already fetched.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !refetch_subscriber(&inner, id, "poll") {
                return;
            }
        }
    })
}

fn dispatch<P>(pending: Dispatches<P>) {
    for (listener, view) in pending {
        listener(view);
    }
}
