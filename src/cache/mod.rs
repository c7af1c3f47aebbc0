//! Ricordo Cache Engine
//!
//! An argument-keyed query cache with subscriber-driven lifetimes:
//!
//! - **Entries**: one per query key, holding payload, retained error, and
//!   request bookkeeping
//! - **Subscriptions**: reference counts that drive fetching, polling, and
//!   the removal grace timer
//! - **Tags**: bidirectional index linking entries to the data they carry,
//!   for mutation-driven invalidation
//!
//! ## Configuration
//!
//! Engine behavior is controlled via `ricordo.toml`:
//!
//! ```toml
//! [cache]
//! unused_entry_grace_period_seconds = 10
//! min_poll_interval_ms = 50
//! ```

mod config;
mod engine;
mod entry;
mod fetch;
mod key;
pub(crate) mod lock;
mod mutation;
mod store;
mod subscription;
mod tags;
mod view;

pub use config::EngineConfig;
pub use engine::{KeyFn, QueryCacheEngine, TagsFn};
pub use entry::QueryStatus;
pub use fetch::{FetchPlan, RequestId, plan};
pub use key::{QueryKey, hash_value};
pub use mutation::UndoToken;
pub use subscription::{Listener, SubscribeOptions, SubscriberId};
pub use tags::Tag;
pub use view::QueryView;
