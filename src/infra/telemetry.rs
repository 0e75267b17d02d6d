//! Tracing subscriber installation and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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

/// Register descriptions for the page cache metrics; idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cached_pagination_hit_total",
            Unit::Count,
            "Total number of pages served from the page cache."
        );
        describe_counter!(
            "cached_pagination_miss_total",
            Unit::Count,
            "Total number of page cache misses that executed the query engine."
        );
        describe_counter!(
            "cached_pagination_bypass_total",
            Unit::Count,
            "Total number of page fetches that skipped a store without tag support."
        );
        describe_counter!(
            "cached_pagination_flush_total",
            Unit::Count,
            "Total number of record set tags flushed after a mutation."
        );
        describe_counter!(
            "cached_pagination_evict_total",
            Unit::Count,
            "Total number of cached pages evicted due to capacity."
        );
        describe_histogram!(
            "cached_pagination_compute_ms",
            Unit::Milliseconds,
            "Query engine latency for page cache misses in milliseconds."
        );
    });
}
