//! End-to-end cache behavior against the in-process item source.
//!
//! Every test runs on a paused tokio clock, so fetch latency, grace timers,
//! and poll cadences are exercised deterministically without real waiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ricordo::cache::{EngineConfig, QueryCacheEngine, QueryKey, QueryView, SubscribeOptions, Tag};
use ricordo::domain::entities::{Item, ItemQuery};
use ricordo::domain::error::FetchErrorKind;
use ricordo::source::MockItemSource;
use tokio::time::sleep;

fn item_engine(source: &Arc<MockItemSource>, grace: Duration) -> QueryCacheEngine<ItemQuery, Item> {
    QueryCacheEngine::new(
        EngineConfig::with_grace(grace),
        source.clone(),
        |args: &ItemQuery| QueryKey::new(format!("item:{}", args.id)),
        |args: &ItemQuery, _item: &Item| vec![Tag::new("item", args.id)],
    )
}

fn recording() -> (
    Arc<Mutex<Vec<QueryView<Item>>>>,
    impl Fn(QueryView<Item>) + Send + Sync + 'static,
) {
    let views = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&views);
    (views, move |view| sink.lock().unwrap().push(view))
}

fn latest(views: &Arc<Mutex<Vec<QueryView<Item>>>>) -> QueryView<Item> {
    views.lock().unwrap().last().cloned().expect("at least one view")
}

#[tokio::test(start_paused = true)]
async fn first_load_goes_loading_then_fulfilled() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(100)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);

    let initial = views.lock().unwrap().first().cloned().expect("initial view");
    assert!(initial.is_loading);
    assert!(initial.is_fetching);
    assert!(initial.data.is_none());

    sleep(Duration::from_millis(150)).await;

    let settled = latest(&views);
    assert!(!settled.is_loading && !settled.is_fetching && !settled.is_error);
    let item = settled.data.expect("payload");
    assert_eq!(item.name, "Item One");
    assert_eq!(item.fetch_count, 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn switching_arguments_keeps_the_previous_payload_on_screen() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(500)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(latest(&views).data.as_ref().map(|i| i.id), Some(1));

    engine.rebind(id, ItemQuery::new(2));

    // While item 2 is in flight the subscriber still sees item 1, so it is
    // fetching but not loading. `current_data` tracks only the new entry.
    let transitional = latest(&views);
    assert!(transitional.is_fetching);
    assert!(!transitional.is_loading);
    assert_eq!(transitional.data.as_ref().map(|i| i.id), Some(1));
    assert!(transitional.current_data.is_none());

    sleep(Duration::from_millis(600)).await;

    let settled = latest(&views);
    assert!(!settled.is_fetching);
    assert_eq!(settled.data.as_ref().map(|i| i.id), Some(2));
    assert_eq!(settled.current_data.as_ref().map(|i| i.id), Some(2));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_request_lands_when_results_cross() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(400)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);

    // Force a second request that finishes before the first one does.
    sleep(Duration::from_millis(100)).await;
    source.set_delay(Duration::from_millis(50));
    engine.refetch(id);

    sleep(Duration::from_millis(100)).await;
    let fast = latest(&views);
    assert!(!fast.is_fetching);
    assert_eq!(fast.data.as_ref().map(|i| i.fetch_count), Some(1));

    // The slow first request resolves now; its stale payload must not land.
    sleep(Duration::from_millis(400)).await;
    let after_slow = latest(&views);
    assert_eq!(after_slow.data.as_ref().map(|i| i.fetch_count), Some(1));
    assert!(!after_slow.is_error);
    assert_eq!(source.calls(), 2);
    assert_eq!(source.successes(), 2);
}

#[tokio::test(start_paused = true)]
async fn a_failed_refetch_keeps_the_last_good_payload() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;

    // Same cache key, but the next request is asked to fail.
    engine.rebind(id, ItemQuery::forced(1));
    engine.refetch(id);
    sleep(Duration::from_millis(100)).await;

    let failed = latest(&views);
    assert!(failed.is_error);
    assert!(!failed.is_fetching);
    let error = failed.error.expect("retained error");
    assert_eq!(error.kind, FetchErrorKind::Server);
    assert_eq!(error.message, "Simulated failure for item 1");
    assert_eq!(failed.data.as_ref().map(|i| i.fetch_count), Some(1));
    assert_eq!(failed.current_data.as_ref().map(|i| i.fetch_count), Some(1));

    // The next success clears the error and replaces the payload.
    engine.rebind(id, ItemQuery::new(1));
    engine.refetch(id);
    sleep(Duration::from_millis(100)).await;

    let recovered = latest(&views);
    assert!(!recovered.is_error);
    assert!(recovered.error.is_none());
    assert_eq!(recovered.data.as_ref().map(|i| i.fetch_count), Some(2));
}

#[tokio::test(start_paused = true)]
async fn a_first_fetch_failure_settles_with_no_payload() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(99), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;

    let settled = latest(&views);
    assert!(settled.is_error);
    assert!(!settled.is_loading && !settled.is_fetching);
    assert!(settled.data.is_none());
    assert!(settled.error.as_ref().is_some_and(|e| e.is_not_found()));
    assert_eq!(source.successes(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalidating_a_tag_refetches_only_entries_with_subscribers() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (first_views, first) = recording();
    let (second_views, second) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), first);
    engine.subscribe(ItemQuery::new(2), SubscribeOptions::default(), second);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 2);

    engine.invalidate(&[Tag::new("item", 1)]);

    // Stale-while-revalidate: the invalidated view keeps its payload while
    // the refetch runs. The untouched key does not move.
    let revalidating = latest(&first_views);
    assert!(revalidating.is_fetching);
    assert!(revalidating.data.is_some());
    assert!(!latest(&second_views).is_fetching);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 3);
    assert_eq!(latest(&first_views).data.map(|i| i.fetch_count), Some(3));
}

#[tokio::test(start_paused = true)]
async fn invalidating_an_idle_entry_defers_the_refetch() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(100)).await;
    engine.unsubscribe(id);

    engine.invalidate(&[Tag::new("item", 1)]);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 1, "idle entries must not refetch eagerly");

    // The deferred mark is consumed by the next subscribe, which refetches
    // while still showing the cached payload.
    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);

    let initial = views.lock().unwrap().first().cloned().expect("initial view");
    assert!(initial.is_fetching);
    assert!(initial.data.is_some());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(latest(&views).data.map(|i| i.fetch_count), Some(2));
}

#[tokio::test(start_paused = true)]
async fn kind_wide_invalidation_reaches_every_entry_of_the_kind() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), |_| {});
    engine.subscribe(ItemQuery::new(2), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 2);

    engine.invalidate_kind("item");
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_grace_drops_entries_with_the_last_unsubscribe() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::ZERO);

    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.entry_count(), 1);

    engine.unsubscribe(id);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(engine.entry_count(), 0);

    // Nothing is left to reuse; the next subscribe pays for a full fetch.
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rebinding_away_starts_the_old_entrys_removal_clock() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_millis(200));

    let (views, listener) = recording();
    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;

    engine.rebind(id, ItemQuery::new(2));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.entry_count(), 2, "the old entry lingers through its grace");
    assert_eq!(source.calls(), 2);

    // Coming back within the grace reuses the old entry without a fetch.
    engine.rebind(id, ItemQuery::new(1));
    let back = latest(&views);
    assert!(!back.is_fetching);
    assert_eq!(back.data.as_ref().map(|i| i.id), Some(1));
    assert_eq!(source.calls(), 2);

    // Now item 2 is the abandoned one and expires on schedule.
    sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.entry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn polling_reissues_the_query_at_the_configured_cadence() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(10)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let id = engine.subscribe(
        ItemQuery::new(1),
        SubscribeOptions::polling(Duration::from_millis(200)),
        |_| {},
    );

    // Initial fetch at t=0, then poll fetches at 200/400/600ms.
    sleep(Duration::from_millis(700)).await;
    assert_eq!(source.calls(), 4);

    engine.unsubscribe(id);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(source.calls(), 4, "unsubscribe must stop the poll loop");
}

#[tokio::test(start_paused = true)]
async fn optimistic_edits_show_immediately_and_roll_back_on_failure() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(latest(&views).data.as_ref().map(|i| i.value), Some(100));

    let token = engine.apply_optimistic(&ItemQuery::new(1), |item| item.value = 999);

    let optimistic = latest(&views);
    assert_eq!(optimistic.data.as_ref().map(|i| i.value), Some(999));
    assert!(!optimistic.is_fetching, "the edit itself goes nowhere near the source");

    engine.rollback(token);
    assert_eq!(latest(&views).data.as_ref().map(|i| i.value), Some(100));
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn committing_an_optimistic_edit_invalidates_back_to_source_truth() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;

    let token = engine.apply_optimistic(&ItemQuery::new(1), |item| item.value = 777);
    engine.commit(token, &[Tag::new("item", 1)]);

    // The commit invalidates, so the entry revalidates while the edited
    // payload stays visible.
    let revalidating = latest(&views);
    assert!(revalidating.is_fetching);
    assert_eq!(revalidating.data.as_ref().map(|i| i.value), Some(777));

    sleep(Duration::from_millis(100)).await;
    let converged = latest(&views);
    assert_eq!(converged.data.as_ref().map(|i| i.value), Some(100));
    assert_eq!(converged.data.as_ref().map(|i| i.fetch_count), Some(2));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn overlapping_edits_roll_back_to_their_own_snapshots() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let (views, listener) = recording();
    engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), listener);
    sleep(Duration::from_millis(100)).await;

    let first = engine.apply_optimistic(&ItemQuery::new(1), |item| item.value = 200);
    let second = engine.apply_optimistic(&ItemQuery::new(1), |item| item.value = 300);
    assert_eq!(latest(&views).data.as_ref().map(|i| i.value), Some(300));

    // Each token restores the payload as it stood when that edit ran.
    engine.rollback(second);
    assert_eq!(latest(&views).data.as_ref().map(|i| i.value), Some(200));
    engine.rollback(first);
    assert_eq!(latest(&views).data.as_ref().map(|i| i.value), Some(100));
}

#[tokio::test(start_paused = true)]
async fn edits_without_a_cached_payload_are_noops_either_way() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(50)));
    let engine = item_engine(&source, Duration::from_secs(10));

    let token = engine.apply_optimistic(&ItemQuery::new(1), |item| item.value = 999);
    engine.rollback(token);

    assert_eq!(engine.entry_count(), 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_success_landing_after_expiry_revives_the_entry() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(500)));
    let engine = item_engine(&source, Duration::from_millis(100));

    let id = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(50)).await;
    engine.unsubscribe(id);

    // Grace expires at 150ms, well before the 500ms fetch resolves.
    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.entry_count(), 0);

    // The late success is still the freshest known payload; it revives the
    // entry and restarts the unused-entry clock.
    sleep(Duration::from_millis(350)).await;
    assert_eq!(engine.entry_count(), 1);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.entry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_late_failure_does_not_revive_an_expired_entry() {
    let source = Arc::new(MockItemSource::new(Duration::from_millis(500)));
    let engine = item_engine(&source, Duration::from_millis(100));

    let id = engine.subscribe(ItemQuery::forced(1), SubscribeOptions::default(), |_| {});
    sleep(Duration::from_millis(50)).await;
    engine.unsubscribe(id);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.entry_count(), 0);

    sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.entry_count(), 0, "failures have nothing worth reviving");
}
