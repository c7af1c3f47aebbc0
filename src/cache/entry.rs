//! Cache entry state.
//!
//! One `CacheEntry` per query key. The entry owns the last applied payload,
//! the latest retained error, and the bookkeeping that decides which
//! in-flight request is allowed to land.

use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::cache::fetch::RequestId;
use crate::cache::tags::Tag;
use crate::domain::error::FetchError;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Entry exists but no request has ever been issued for it.
    Uninitialized,
    /// A request is in flight.
    Pending,
    /// The latest settled request succeeded.
    Fulfilled,
    /// The latest settled request failed.
    Rejected,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Uninitialized => "uninitialized",
            QueryStatus::Pending => "pending",
            QueryStatus::Fulfilled => "fulfilled",
            QueryStatus::Rejected => "rejected",
        }
    }
}

/// Scheduled removal of an entry nobody subscribes to.
///
/// The epoch distinguishes this schedule from any later reschedule for the
/// same key; a removal only lands while its epoch is still current.
pub(crate) struct RemovalTimer {
    pub(crate) epoch: u64,
    pub(crate) handle: JoinHandle<()>,
}

/// One cached query: payload, retained error, and request bookkeeping.
pub(crate) struct CacheEntry<A, P> {
    /// Arguments from the most recent subscribe/rebind touch. Refetches for
    /// this key are issued with these.
    pub(crate) last_args: A,
    pub(crate) status: QueryStatus,
    /// Last successfully applied payload. Survives later failures.
    pub(crate) data: Option<P>,
    /// Error from the latest settled request. Cleared by the next success.
    pub(crate) error: Option<FetchError>,
    pub(crate) fulfilled_at: Option<OffsetDateTime>,
    /// Id of the most recently issued request. Only its result may land.
    pub(crate) latest_request: Option<RequestId>,
    /// Tags bound from the latest applied payload.
    pub(crate) tags: Vec<Tag>,
    /// An invalidation arrived while nobody subscribed; the next touch must
    /// refetch even though the entry still looks fulfilled.
    pub(crate) needs_refetch: bool,
    pub(crate) removal: Option<RemovalTimer>,
}

impl<A, P> CacheEntry<A, P> {
    pub(crate) fn new(args: A) -> Self {
        Self {
            last_args: args,
            status: QueryStatus::Uninitialized,
            data: None,
            error: None,
            fulfilled_at: None,
            latest_request: None,
            tags: Vec::new(),
            needs_refetch: false,
            removal: None,
        }
    }

    /// Marks `request` as the one whose result may land and moves the entry
    /// to `Pending`. Consumes any deferred-refetch mark.
    pub(crate) fn begin_request(&mut self, request: RequestId) {
        self.latest_request = Some(request);
        self.status = QueryStatus::Pending;
        self.needs_refetch = false;
    }

    /// True while `request` is still the latest issued for this entry.
    pub(crate) fn accepts(&self, request: RequestId) -> bool {
        self.latest_request == Some(request)
    }

    pub(crate) fn apply_success(&mut self, payload: P) {
        self.status = QueryStatus::Fulfilled;
        self.data = Some(payload);
        self.error = None;
        self.fulfilled_at = Some(OffsetDateTime::now_utc());
    }

    /// Records a failure. The previous payload, if any, stays available.
    pub(crate) fn apply_failure(&mut self, error: FetchError) {
        self.status = QueryStatus::Rejected;
        self.error = Some(error);
    }

    /// Aborts a scheduled removal, if one is pending. Returns whether a
    /// timer was cancelled.
    pub(crate) fn cancel_removal(&mut self) -> bool {
        match self.removal.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}
