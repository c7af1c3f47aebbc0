use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "ricordo_cache_entries",
            Unit::Count,
            "Current number of entries in the query cache."
        );
        describe_counter!(
            "ricordo_cache_entry_removed_total",
            Unit::Count,
            "Total number of cache entries removed, labelled by reason."
        );
        describe_counter!(
            "ricordo_fetch_started_total",
            Unit::Count,
            "Total number of fetches issued to the query source."
        );
        describe_counter!(
            "ricordo_fetch_applied_total",
            Unit::Count,
            "Total number of fetch results applied to the cache."
        );
        describe_counter!(
            "ricordo_fetch_superseded_total",
            Unit::Count,
            "Total number of fetch results discarded because a newer request was issued."
        );
        describe_counter!(
            "ricordo_fetch_failed_total",
            Unit::Count,
            "Total number of fetches that ended in an error."
        );
        describe_histogram!(
            "ricordo_fetch_duration_ms",
            Unit::Milliseconds,
            "Source fetch latency in milliseconds."
        );
        describe_counter!(
            "ricordo_cache_removal_cancelled_total",
            Unit::Count,
            "Total number of scheduled removals cancelled by a new subscriber."
        );
        describe_counter!(
            "ricordo_invalidation_refetch_total",
            Unit::Count,
            "Total number of watched entries refetched by a tag invalidation."
        );
        describe_counter!(
            "ricordo_invalidation_deferred_total",
            Unit::Count,
            "Total number of unwatched entries marked stale by a tag invalidation."
        );
        describe_counter!(
            "ricordo_mutation_optimistic_total",
            Unit::Count,
            "Total number of optimistic edits applied to cached data."
        );
        describe_counter!(
            "ricordo_mutation_rollback_total",
            Unit::Count,
            "Total number of optimistic edits rolled back."
        );
    });
}
