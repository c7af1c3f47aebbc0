//! Fetch planning.
//!
//! Pure decision logic for whether touching an entry issues an upstream
//! request. Kept free of locks and tasks so every arm stays unit-testable.

use crate::cache::entry::QueryStatus;

/// Monotonic identity of one issued request. Later ids always win: an
/// entry only applies the result whose id is still its latest.
pub type RequestId = u64;

/// Outcome of planning a fetch against an entry's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Issue a request. Any in-flight request for the key is superseded.
    Issue,
    /// Reuse the entry as-is; nothing goes upstream.
    Skip,
}

impl FetchPlan {
    pub fn should_issue(self) -> bool {
        matches!(self, FetchPlan::Issue)
    }
}

/// Decides whether a subscription touch or refetch issues a request.
///
/// `force` comes from explicit refetches and live invalidation; it always
/// issues. A deferred-refetch mark behaves the same so the first consumer
/// after an unobserved invalidation gets fresh data.
pub fn plan(status: QueryStatus, needs_refetch: bool, force: bool) -> FetchPlan {
    if force || needs_refetch {
        return FetchPlan::Issue;
    }

    match status {
        QueryStatus::Uninitialized | QueryStatus::Rejected => FetchPlan::Issue,
        QueryStatus::Pending | QueryStatus::Fulfilled => FetchPlan::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_entries_issue() {
        assert_eq!(plan(QueryStatus::Uninitialized, false, false), FetchPlan::Issue);
    }

    #[test]
    fn pending_entries_share_the_in_flight_request() {
        assert_eq!(plan(QueryStatus::Pending, false, false), FetchPlan::Skip);
    }

    #[test]
    fn fulfilled_entries_are_cache_hits() {
        assert_eq!(plan(QueryStatus::Fulfilled, false, false), FetchPlan::Skip);
    }

    #[test]
    fn rejected_entries_retry_on_next_touch() {
        assert_eq!(plan(QueryStatus::Rejected, false, false), FetchPlan::Issue);
    }

    #[test]
    fn force_supersedes_a_fulfilled_entry() {
        assert_eq!(plan(QueryStatus::Fulfilled, false, true), FetchPlan::Issue);
    }

    #[test]
    fn force_supersedes_an_in_flight_request() {
        assert_eq!(plan(QueryStatus::Pending, false, true), FetchPlan::Issue);
    }

    #[test]
    fn deferred_mark_issues_even_when_fulfilled() {
        assert_eq!(plan(QueryStatus::Fulfilled, true, false), FetchPlan::Issue);
    }

    #[test]
    fn deferred_mark_issues_even_when_pending() {
        assert_eq!(plan(QueryStatus::Pending, true, false), FetchPlan::Issue);
    }
}
