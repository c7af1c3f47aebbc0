use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use rand::Rng;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::domain::entities::{Item, Screening, ScreeningListItem, ScreeningPatch};

use super::error::ApiError;
use super::state::DemoState;

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    delay: Option<u64>,
    fail: Option<bool>,
    fail_rate: Option<f64>,
}

/// Serve a single item after a simulated network delay.
///
/// `delay` overrides the configured latency in milliseconds, `fail` forces a
/// 500, and `failRate` fails with the given probability. The failure check
/// runs before the lookup so even unknown ids can exercise the error path.
pub async fn get_item(
    State(state): State<DemoState>,
    Path(id): Path<u32>,
    Query(params): Query<ItemParams>,
) -> Result<Json<Item>, ApiError> {
    let delay = params
        .delay
        .map(Duration::from_millis)
        .unwrap_or(state.item_delay);
    let fail = params.fail.unwrap_or(false);
    let fail_rate = params.fail_rate.unwrap_or(0.0);

    debug!(
        id,
        delay_ms = delay.as_millis() as u64,
        fail,
        fail_rate,
        "Serving item request"
    );
    sleep(delay).await;

    if fail || (fail_rate > 0.0 && rand::rng().random::<f64>() < fail_rate) {
        return Err(ApiError::server(format!("Simulated failure for item {id}")));
    }

    state
        .store
        .fetch_item(id)
        .map(Json)
        .ok_or(ApiError::not_found("Item not found"))
}

pub async fn list_screenings(State(state): State<DemoState>) -> Json<Vec<ScreeningListItem>> {
    sleep(state.screening_delay).await;
    Json(state.store.list_screenings())
}

pub async fn get_screening(
    State(state): State<DemoState>,
    Path(id): Path<u32>,
) -> Result<Json<Screening>, ApiError> {
    sleep(state.screening_delay).await;
    state
        .store
        .screening(id)
        .map(Json)
        .ok_or(ApiError::not_found("Screening not found"))
}

pub async fn update_screening(
    State(state): State<DemoState>,
    Path(id): Path<u32>,
    Json(patch): Json<ScreeningPatch>,
) -> Result<Json<Screening>, ApiError> {
    sleep(state.screening_delay).await;
    debug!(id, ?patch, "Patching screening");
    state
        .store
        .apply_patch(id, &patch)
        .map(Json)
        .ok_or(ApiError::not_found("Screening not found"))
}

/// Re-randomize a screening's risk score, as a fresh screening run would.
pub async fn rescreen_screening(
    State(state): State<DemoState>,
    Path(id): Path<u32>,
) -> Result<Json<Screening>, ApiError> {
    sleep(state.screening_delay).await;
    let score = f64::from(rand::rng().random_range(0..=100u8)) / 10.0;
    state
        .store
        .rescreen(id, score)
        .map(Json)
        .ok_or(ApiError::not_found("Screening not found"))
}
