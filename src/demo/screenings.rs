//! Screenings walkthrough against a live in-process server.
//!
//! Spawns the demo REST server on an ephemeral port, then mirrors the
//! screening manager UI: a list subscriber, a detail subscriber that follows
//! the selection, an optimistic status update confirmed by the server, a
//! rescreen with tag invalidation, and a failed update that rolls back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::error;

use crate::cache::{EngineConfig, QueryCacheEngine, QueryKey, QueryView, SubscribeOptions, Tag};
use crate::config::DemoSettings;
use crate::domain::entities::{Screening, ScreeningListQuery, ScreeningPatch, ScreeningQuery};
use crate::domain::types::{Assignee, ScreeningStatus};
use crate::infra::error::{AppError, InfraError};
use crate::infra::http::{DemoState, build_router};
use crate::source::{HttpScreeningListSource, HttpScreeningSource, ScreeningClient};

use super::timeline::Timeline;

pub async fn run(demo: &DemoSettings) -> Result<(), AppError> {
    let timeline = Timeline::start();

    let state = DemoState::new(demo.item_delay, demo.screening_delay);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(InfraError::from)?;
    let addr = listener.local_addr().map_err(InfraError::from)?;
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            error!(error = %err, "demo server stopped");
        }
    });
    timeline.row("demo", format!("screenings server on http://{addr}"));

    let client = ScreeningClient::new(&format!("http://{addr}"))?;
    let list_engine = QueryCacheEngine::new(
        EngineConfig::with_grace(demo.grace_period),
        Arc::new(HttpScreeningListSource::new(client.clone())),
        |_args: &ScreeningListQuery| QueryKey::new("screenings"),
        |_args: &ScreeningListQuery, _list: &Vec<_>| Vec::new(),
    );
    let detail_engine = QueryCacheEngine::new(
        EngineConfig::with_grace(demo.grace_period),
        Arc::new(HttpScreeningSource::new(client.clone())),
        |args: &ScreeningQuery| QueryKey::from(format!("screening:{}", args.id)),
        |args: &ScreeningQuery, _screening: &Screening| vec![Tag::new("screening", args.id)],
    );

    let settle = demo.screening_delay + Duration::from_millis(200);

    timeline.heading("Load the screening list");
    let list_sub = list_engine.subscribe(
        ScreeningListQuery,
        SubscribeOptions::default(),
        move |view| {
            if view.is_loading {
                timeline.row("list", "loading screenings...");
            } else if let Some(list) = view.data.as_ref() {
                let titles: Vec<String> =
                    list.iter().map(|item| short_title(&item.title)).collect();
                timeline.row(
                    "list",
                    format!("{} screenings: {}", list.len(), titles.join(", ")),
                );
            }
        },
    );
    sleep(settle).await;

    timeline.heading("Open screening 1");
    let selected = Arc::new(AtomicU32::new(1));
    let follow = selected.clone();
    let detail_sub = detail_engine.subscribe(
        ScreeningQuery::new(1),
        SubscribeOptions::default(),
        move |view| {
            let wanted = follow.load(Ordering::Relaxed);
            let switching =
                view.is_fetching && view.data.as_ref().map(|s| s.id) != Some(wanted);
            timeline.row("detail", describe(&view, switching));
        },
    );
    sleep(settle).await;

    timeline.heading("Switch to screening 2");
    selected.store(2, Ordering::Relaxed);
    detail_engine.rebind(detail_sub, ScreeningQuery::new(2));
    sleep(settle).await;

    timeline.heading("Optimistic status update, confirmed by the server");
    let token = detail_engine.apply_optimistic(&ScreeningQuery::new(2), |screening| {
        screening.status = ScreeningStatus::Closed;
    });
    timeline.row("demo", "status flipped before the server replied");
    match client
        .update(2, &ScreeningPatch::status(ScreeningStatus::Closed))
        .await
    {
        Ok(_) => {
            timeline.row("demo", "server accepted; invalidating screening#2");
            detail_engine.commit(token, &[Tag::new("screening", 2)]);
        }
        Err(err) => {
            timeline.row("demo", format!("update failed: {err}"));
            detail_engine.rollback(token);
        }
    }
    sleep(settle).await;

    timeline.heading("Rescreen re-randomizes the risk score");
    match client.rescreen(2).await {
        Ok(updated) => {
            timeline.row(
                "demo",
                format!("server risk score now {:.1}", updated.risk_score),
            );
            detail_engine.invalidate(&[Tag::new("screening", 2)]);
        }
        Err(err) => timeline.row("demo", format!("rescreen failed: {err}")),
    }
    sleep(settle).await;

    timeline.heading("A failed update rolls back");
    server.abort();
    timeline.row("demo", "server stopped; the next write cannot land");
    let token = detail_engine.apply_optimistic(&ScreeningQuery::new(2), |screening| {
        screening.assignee = Assignee::Adam;
    });
    sleep(Duration::from_millis(100)).await;
    match client
        .update(2, &ScreeningPatch::assignee(Assignee::Adam))
        .await
    {
        Ok(_) => detail_engine.commit(token, &[Tag::new("screening", 2)]),
        Err(err) => {
            timeline.row("demo", format!("update failed: {err}"));
            detail_engine.rollback(token);
        }
    }
    sleep(Duration::from_millis(100)).await;

    list_engine.unsubscribe(list_sub);
    detail_engine.unsubscribe(detail_sub);

    timeline.heading("Done");
    timeline.row(
        "demo",
        format!(
            "{} detail entries cached, {} list entries cached",
            detail_engine.entry_count(),
            list_engine.entry_count()
        ),
    );

    Ok(())
}

fn short_title(title: &str) -> String {
    if title.len() > 10 {
        format!("{}...{}", &title[..6], &title[title.len() - 4..])
    } else {
        title.to_string()
    }
}

fn describe(view: &QueryView<Screening>, switching: bool) -> String {
    if switching {
        return "loading...".to_string();
    }
    let Some(screening) = view.data.as_ref() else {
        return match view.error.as_ref() {
            Some(err) => format!("error: {err}"),
            None => "no screening selected".to_string(),
        };
    };

    let mut line = format!(
        "{} status={} assignee={} risk={:.1}",
        short_title(&screening.title),
        screening.status.as_str(),
        screening.assignee.as_str(),
        screening.risk_score
    );
    if view.is_fetching {
        line.push_str(" (revalidating)");
    }
    if let Some(err) = view.error.as_ref() {
        line.push_str(&format!(" error={err}"));
    }
    line
}
