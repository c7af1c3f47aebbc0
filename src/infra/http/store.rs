use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::domain::entities::{Item, Screening, ScreeningListItem, ScreeningPatch};
use crate::domain::types::{Assignee, ScreeningStatus};

/// In-memory backing store for the demo REST server.
///
/// Seeded at construction with a fixed set of items and screenings so the
/// server behaves the same on every run. Shared across handlers behind an
/// `Arc`, so interior mutability goes through `DashMap` and atomics.
pub struct DemoStore {
    items: DashMap<u32, SeedItem>,
    screenings: DashMap<u32, Screening>,
    successful_fetches: AtomicU64,
}

struct SeedItem {
    name: &'static str,
    value: i64,
}

impl DemoStore {
    pub fn new() -> Self {
        let items = DashMap::new();
        items.insert(
            1,
            SeedItem {
                name: "Item One",
                value: 100,
            },
        );
        items.insert(
            2,
            SeedItem {
                name: "Item Two",
                value: 200,
            },
        );
        items.insert(
            3,
            SeedItem {
                name: "Item Three",
                value: 300,
            },
        );

        let screenings = DashMap::new();
        for screening in seed_screenings() {
            screenings.insert(screening.id, screening);
        }

        Self {
            items,
            screenings,
            successful_fetches: AtomicU64::new(0),
        }
    }

    /// Look up an item and stamp it with the next global fetch count.
    ///
    /// The counter only advances for requests that actually produce an item,
    /// so callers can use `fetchCount` to tell cached reads from real ones.
    pub fn fetch_item(&self, id: u32) -> Option<Item> {
        let seed = self.items.get(&id)?;
        let fetch_count = self.successful_fetches.fetch_add(1, Ordering::Relaxed) + 1;
        Some(Item {
            id,
            name: seed.name.to_string(),
            value: seed.value,
            fetch_count,
            fetched_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn list_screenings(&self) -> Vec<ScreeningListItem> {
        let mut list: Vec<ScreeningListItem> = self
            .screenings
            .iter()
            .map(|entry| ScreeningListItem {
                id: entry.id,
                title: entry.title.clone(),
            })
            .collect();
        list.sort_by_key(|item| item.id);
        list
    }

    pub fn screening(&self, id: u32) -> Option<Screening> {
        self.screenings.get(&id).map(|entry| entry.clone())
    }

    pub fn apply_patch(&self, id: u32, patch: &ScreeningPatch) -> Option<Screening> {
        let mut entry = self.screenings.get_mut(&id)?;
        patch.apply_to(&mut entry);
        Some(entry.clone())
    }

    pub fn rescreen(&self, id: u32, risk_score: f64) -> Option<Screening> {
        let mut entry = self.screenings.get_mut(&id)?;
        entry.risk_score = risk_score;
        Some(entry.clone())
    }
}

impl Default for DemoStore {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_screenings() -> Vec<Screening> {
    vec![
        Screening {
            id: 1,
            title: "0x3f5CE5FBFe3E9af3971dD833D26bA9b5C936f0bE".to_string(),
            status: ScreeningStatus::Open,
            assignee: Assignee::Adam,
            risk_score: 7.2,
        },
        Screening {
            id: 2,
            title: "0x53d284357ec70cE289D6D64134DfAc8E511c8a3D".to_string(),
            status: ScreeningStatus::Open,
            assignee: Assignee::Joe,
            risk_score: 4.5,
        },
        Screening {
            id: 3,
            title: "0xfE9e8709d3215310075d67E3ed32A380CCf451C8".to_string(),
            status: ScreeningStatus::Closed,
            assignee: Assignee::Adam,
            risk_score: 2.1,
        },
        Screening {
            id: 4,
            title: "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".to_string(),
            status: ScreeningStatus::Open,
            assignee: Assignee::Joe,
            risk_score: 8.9,
        },
        Screening {
            id: 5,
            title: "0xDC76CD25977E0a5Ae17155770273aD58648900D3".to_string(),
            status: ScreeningStatus::Closed,
            assignee: Assignee::Joe,
            risk_score: 5.6,
        },
    ]
}
