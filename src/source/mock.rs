//! In-process item source.
//!
//! Mirrors the demo API's `/api/items/{id}` behavior without a server:
//! fixed latency, failures forced through the arguments or rolled from a
//! failure rate, and a success counter stamped into every payload.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use time::OffsetDateTime;

use crate::cache::lock::mutex_lock;
use crate::domain::entities::{Item, ItemQuery};
use crate::domain::error::FetchError;
use crate::source::QuerySource;

const SOURCE: &str = "source::mock";

struct ItemSeed {
    name: &'static str,
    value: i64,
}

/// Simulated upstream for item queries.
///
/// Checks run in the same order as the demo API: latency first, then the
/// failure roll, then existence. Only successful responses advance the
/// shared fetch counter.
pub struct MockItemSource {
    items: HashMap<u32, ItemSeed>,
    delay: Mutex<Duration>,
    fail_rate: Mutex<f64>,
    successes: AtomicU64,
    calls: AtomicU64,
}

impl MockItemSource {
    pub fn new(delay: Duration) -> Self {
        let mut items = HashMap::new();
        items.insert(
            1,
            ItemSeed {
                name: "Item One",
                value: 100,
            },
        );
        items.insert(
            2,
            ItemSeed {
                name: "Item Two",
                value: 200,
            },
        );
        items.insert(
            3,
            ItemSeed {
                name: "Item Three",
                value: 300,
            },
        );

        Self {
            items,
            delay: Mutex::new(delay),
            fail_rate: Mutex::new(0.0),
            successes: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Every request fails with probability `rate` (rolled after the
    /// latency, like the demo API).
    pub fn with_fail_rate(self, rate: f64) -> Self {
        *mutex_lock(&self.fail_rate, SOURCE, "with_fail_rate") = rate;
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *mutex_lock(&self.delay, SOURCE, "set_delay") = delay;
    }

    pub fn set_fail_rate(&self, rate: f64) {
        *mutex_lock(&self.fail_rate, SOURCE, "set_fail_rate") = rate;
    }

    /// Total requests seen, including failures.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Successful responses served so far.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySource<ItemQuery, Item> for MockItemSource {
    async fn fetch(&self, args: &ItemQuery) -> Result<Item, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *mutex_lock(&self.delay, SOURCE, "fetch.delay");
        tokio::time::sleep(delay).await;

        let fail_rate = *mutex_lock(&self.fail_rate, SOURCE, "fetch.fail_rate");
        if args.force_error || (fail_rate > 0.0 && rand::rng().random::<f64>() < fail_rate) {
            return Err(FetchError::server(format!(
                "Simulated failure for item {}",
                args.id
            )));
        }

        let Some(seed) = self.items.get(&args.id) else {
            return Err(FetchError::not_found("Item not found"));
        };

        let fetch_count = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Item {
            id: args.id,
            name: seed.name.to_string(),
            value: seed.value,
            fetch_count,
            fetched_at: OffsetDateTime::now_utc(),
        })
    }
}
