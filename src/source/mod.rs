//! Query sources.
//!
//! A `QuerySource` is the upstream a cache engine fetches from. The engine
//! treats it as a black box: one call per issued request, returning either
//! a payload or a terminal error.

use async_trait::async_trait;

use crate::domain::error::FetchError;

mod http;
mod mock;

pub use http::{HttpScreeningListSource, HttpScreeningSource, ScreeningClient};
pub use mock::MockItemSource;

/// Upstream data source for one engine.
///
/// Transport failures and upstream rejections both surface as `FetchError`;
/// the engine does not distinguish how a request died.
#[async_trait]
pub trait QuerySource<A, P>: Send + Sync {
    async fn fetch(&self, args: &A) -> Result<P, FetchError>;
}
