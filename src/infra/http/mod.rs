//! Demo REST server.
//!
//! A small axum app that mimics the upstream services the query engine is
//! pointed at during demos and tests: a slow item endpoint with failure
//! injection, and a screenings CRUD surface backed by an in-memory store.

mod error;
mod handlers;
mod state;
mod store;

pub use state::DemoState;
pub use store::DemoStore;

use axum::{
    Router,
    routing::{get, post},
};

pub fn build_router(state: DemoState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/items/{id}", get(handlers::get_item))
        .route("/api/screenings", get(handlers::list_screenings))
        .route(
            "/api/screenings/{id}",
            get(handlers::get_screening).patch(handlers::update_screening),
        )
        .route(
            "/api/screenings/{id}/rescreen",
            post(handlers::rescreen_screening),
        )
        .with_state(state)
}
