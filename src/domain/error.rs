use std::fmt;

use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The requested resource does not exist upstream.
    NotFound,
    /// The upstream failed while producing a response.
    Server,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::NotFound => f.write_str("not_found"),
            FetchErrorKind::Server => f.write_str("server"),
        }
    }
}

/// Terminal failure of one upstream request, as retained on a cache entry.
///
/// Carries the moment the failure was observed so views can show how stale
/// the retained error is.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub occurred_at: OffsetDateTime,
}

impl FetchError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::NotFound,
            message: message.into(),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Server,
            message: message.into(),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == FetchErrorKind::NotFound
    }
}
