//! Item walkthrough against the in-process mock source.
//!
//! Drives one engine through the interactions a UI produces: first load,
//! switching arguments mid-flight, error recovery, expiry, polling, and tag
//! invalidation. Every view change lands on the timeline via the registered
//! listeners.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::cache::{EngineConfig, QueryCacheEngine, QueryKey, QueryView, SubscribeOptions, Tag};
use crate::config::DemoSettings;
use crate::domain::entities::{Item, ItemQuery};
use crate::infra::error::AppError;
use crate::source::MockItemSource;

use super::timeline::Timeline;

pub async fn run(demo: &DemoSettings) -> Result<(), AppError> {
    let timeline = Timeline::start();
    let source = Arc::new(MockItemSource::new(demo.item_delay));
    let engine = QueryCacheEngine::new(
        EngineConfig::with_grace(demo.grace_period),
        source.clone(),
        |args: &ItemQuery| QueryKey::from(format!("item:{}", args.id)),
        |args: &ItemQuery, _item: &Item| vec![Tag::new("item", args.id)],
    );

    // Enough slack after each fetch for the result to land and dispatch.
    let settle = demo.item_delay + Duration::from_millis(150);

    timeline.row(
        "demo",
        format!(
            "item delay {}ms, grace period {}s",
            demo.item_delay.as_millis(),
            demo.grace_period.as_secs()
        ),
    );

    timeline.heading("Cold load");
    let viewer = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), move |view| {
        timeline.row("viewer", describe(&view));
    });
    sleep(settle).await;

    timeline.heading("Switch to item 2 while it is still in flight");
    engine.rebind(viewer, ItemQuery::new(2));
    timeline.row(
        "demo",
        "the previous payload stays visible until item 2 lands",
    );
    sleep(settle).await;

    timeline.heading("Switch back to item 1 (still cached)");
    let calls_before = source.calls();
    engine.rebind(viewer, ItemQuery::new(1));
    sleep(Duration::from_millis(100)).await;
    timeline.row(
        "demo",
        format!(
            "served from cache, source calls {} -> {}",
            calls_before,
            source.calls()
        ),
    );

    timeline.heading("Forced refetch bypasses the cache");
    engine.refetch(viewer);
    sleep(settle).await;

    timeline.heading("A failing refetch keeps the last good payload");
    engine.rebind(viewer, ItemQuery::forced(1));
    engine.refetch(viewer);
    sleep(settle).await;

    timeline.heading("The next success clears the error");
    engine.rebind(viewer, ItemQuery::new(1));
    engine.refetch(viewer);
    sleep(settle).await;

    timeline.heading("Unsubscribe, then return inside the grace period");
    engine.unsubscribe(viewer);
    sleep(demo.grace_period / 2).await;
    let calls_before = source.calls();
    let viewer = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), move |view| {
        timeline.row("viewer", describe(&view));
    });
    sleep(Duration::from_millis(100)).await;
    timeline.row(
        "demo",
        format!(
            "data was waiting, source calls {} -> {}",
            calls_before,
            source.calls()
        ),
    );

    timeline.heading("Unsubscribe, then return after the grace period");
    engine.unsubscribe(viewer);
    sleep(demo.grace_period + Duration::from_millis(200)).await;
    timeline.row(
        "demo",
        format!("entry expired, {} entries cached", engine.entry_count()),
    );
    let viewer = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), move |view| {
        timeline.row("viewer", describe(&view));
    });
    sleep(settle).await;
    engine.unsubscribe(viewer);

    timeline.heading("Polling re-issues the query on an interval");
    let poll_every = demo.item_delay * 3;
    let poller = engine.subscribe(
        ItemQuery::new(3),
        SubscribeOptions::polling(poll_every),
        move |view| {
            timeline.row("poller", describe(&view));
        },
    );
    sleep(poll_every * 2 + settle).await;
    engine.unsubscribe(poller);

    timeline.heading("Invalidating a tag refetches live entries");
    let first = engine.subscribe(ItemQuery::new(1), SubscribeOptions::default(), move |view| {
        timeline.row("item-1", describe(&view));
    });
    let second = engine.subscribe(ItemQuery::new(2), SubscribeOptions::default(), move |view| {
        timeline.row("item-2", describe(&view));
    });
    sleep(settle).await;
    timeline.row("demo", "invalidating item#1; item 2 is untouched");
    engine.invalidate(&[Tag::new("item", 1)]);
    sleep(settle).await;

    timeline.heading("Invalidating an idle entry defers the refetch");
    engine.unsubscribe(second);
    let calls_before = source.calls();
    engine.invalidate(&[Tag::new("item", 2)]);
    sleep(Duration::from_millis(100)).await;
    timeline.row(
        "demo",
        format!(
            "no subscriber, no fetch yet, source calls {} -> {}",
            calls_before,
            source.calls()
        ),
    );
    timeline.row("demo", "the next subscriber pays for the refresh");
    let second = engine.subscribe(ItemQuery::new(2), SubscribeOptions::default(), move |view| {
        timeline.row("item-2", describe(&view));
    });
    sleep(settle).await;

    engine.unsubscribe(first);
    engine.unsubscribe(second);

    timeline.heading("Done");
    timeline.row(
        "demo",
        format!(
            "{} source calls, {} successful, {} entries still cached",
            source.calls(),
            source.successes(),
            engine.entry_count()
        ),
    );

    Ok(())
}

fn describe(view: &QueryView<Item>) -> String {
    let mut flags = Vec::new();
    if view.is_loading {
        flags.push("loading");
    }
    if view.is_fetching {
        flags.push("fetching");
    }
    if view.is_error {
        flags.push("error");
    }
    let flags = if flags.is_empty() {
        "settled".to_string()
    } else {
        flags.join("+")
    };

    let data = match view.data.as_ref() {
        Some(item) => format!("{} (fetch #{})", item.name, item.fetch_count),
        None => "-".to_string(),
    };
    let error = match view.error.as_ref() {
        Some(err) => err.to_string(),
        None => "-".to_string(),
    };

    format!("[{flags}] data={data} error={error}")
}
