use std::sync::Arc;
use std::time::Duration;

use super::store::DemoStore;

/// Shared state for the demo server handlers.
#[derive(Clone)]
pub struct DemoState {
    pub store: Arc<DemoStore>,
    pub item_delay: Duration,
    pub screening_delay: Duration,
}

impl DemoState {
    pub fn new(item_delay: Duration, screening_delay: Duration) -> Self {
        Self {
            store: Arc::new(DemoStore::new()),
            item_delay,
            screening_delay,
        }
    }
}
