//! Entity types shared by the cache engine demos and the demo API.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::{Assignee, ScreeningStatus};

/// A catalog item as served by `GET /api/items/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub value: i64,
    /// Server-global count of successful item fetches, stamped per response.
    pub fetch_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

/// Arguments for an item lookup.
///
/// Only `id` participates in cache identity; `force_error` parameterizes the
/// request without creating a separate cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub id: u32,
    pub force_error: bool,
}

impl ItemQuery {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            force_error: false,
        }
    }

    pub fn forced(id: u32) -> Self {
        Self {
            id,
            force_error: true,
        }
    }
}

/// A screening case as served by `GET /api/screenings/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screening {
    pub id: u32,
    pub title: String,
    pub status: ScreeningStatus,
    pub assignee: Assignee,
    pub risk_score: f64,
}

/// Compact row for `GET /api/screenings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningListItem {
    pub id: u32,
    pub title: String,
}

/// Partial update body for `PATCH /api/screenings/{id}`.
///
/// Absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ScreeningStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

impl ScreeningPatch {
    pub fn status(status: ScreeningStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn assignee(assignee: Assignee) -> Self {
        Self {
            assignee: Some(assignee),
            ..Self::default()
        }
    }

    /// Copies every present field onto `screening`.
    pub fn apply_to(&self, screening: &mut Screening) {
        if let Some(title) = &self.title {
            screening.title = title.clone();
        }
        if let Some(status) = self.status {
            screening.status = status;
        }
        if let Some(assignee) = self.assignee {
            screening.assignee = assignee;
        }
        if let Some(risk_score) = self.risk_score {
            screening.risk_score = risk_score;
        }
    }
}

/// Arguments for a single-screening lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreeningQuery {
    pub id: u32,
}

impl ScreeningQuery {
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

/// Arguments for the screening list. The list has a single cache identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScreeningListQuery;
