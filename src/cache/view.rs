//! Query view projection.
//!
//! A `QueryView` is what one subscriber currently sees for its query. Views
//! are derived on demand from entry state plus the subscriber's own sticky
//! fallback; they hold no authority of their own.

use crate::cache::entry::{CacheEntry, QueryStatus};
use crate::domain::error::FetchError;

/// One subscriber's rendering of its cache entry.
///
/// `data` prefers the entry's payload and falls back to the last payload
/// this subscriber was shown, so switching arguments keeps something on
/// screen while the new fetch runs. `current_data` never falls back.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView<P> {
    /// A request is in flight and the subscriber has nothing to show.
    pub is_loading: bool,
    /// A request for the subscriber's current key is in flight.
    pub is_fetching: bool,
    /// The latest settled request for the current key failed.
    pub is_error: bool,
    /// Entry payload, or the subscriber's sticky fallback.
    pub data: Option<P>,
    /// Entry payload only, `None` whenever the entry has none.
    pub current_data: Option<P>,
    /// Retained error of the current key, if the entry holds one.
    pub error: Option<FetchError>,
}

impl<P: Clone> QueryView<P> {
    /// Projects the view of a subscriber bound to `entry`, with `sticky` as
    /// the last payload that subscriber was shown.
    pub(crate) fn project<A>(entry: &CacheEntry<A, P>, sticky: Option<&P>) -> Self {
        let is_fetching = entry.status == QueryStatus::Pending;
        let current_data = entry.data.clone();
        let data = current_data.clone().or_else(|| sticky.cloned());

        Self {
            is_loading: is_fetching && data.is_none(),
            is_fetching,
            is_error: entry.status == QueryStatus::Rejected,
            data,
            current_data,
            error: entry.error.clone(),
        }
    }

    /// View of a subscriber whose entry does not exist yet (or any more).
    pub(crate) fn detached(sticky: Option<&P>) -> Self {
        Self {
            is_loading: false,
            is_fetching: false,
            is_error: false,
            data: sticky.cloned(),
            current_data: None,
            error: None,
        }
    }
}
