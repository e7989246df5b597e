//! # Metrics
//!
//! Counter and gauge names emitted by the gateway, and the Prometheus
//! recorder that renders them for `GET /metrics`.

use crate::core::error::{GatewayError, GatewayResult};
use ::metrics::{describe_counter, describe_gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const LOOKUPS_TOTAL: &str = "pickup_lookups_total";
pub const UPSTREAM_CALLS_TOTAL: &str = "pickup_upstream_calls_total";
pub const RATE_LIMITED_TOTAL: &str = "pickup_rate_limited_total";
pub const BREAKER_OPENED_TOTAL: &str = "pickup_breaker_opened_total";
pub const CACHE_ENTRIES: &str = "pickup_cache_entries";

/// Install the global Prometheus recorder and return its render handle
pub fn install_prometheus_recorder() -> GatewayResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::internal(format!("Failed to install metrics recorder: {}", e)))?;
    describe_metrics();
    Ok(handle)
}

/// Register help text for every metric the gateway emits
pub fn describe_metrics() {
    describe_counter!(
        LOOKUPS_TOTAL,
        Unit::Count,
        "Pickup-point lookups answered, labelled by source"
    );
    describe_counter!(
        UPSTREAM_CALLS_TOTAL,
        Unit::Count,
        "Calls made to the courier search API, labelled by outcome"
    );
    describe_counter!(
        RATE_LIMITED_TOTAL,
        Unit::Count,
        "Lookups rejected by the per-client rate limiter"
    );
    describe_counter!(
        BREAKER_OPENED_TOTAL,
        Unit::Count,
        "Times the upstream circuit breaker opened"
    );
    describe_gauge!(CACHE_ENTRIES, Unit::Count, "Entries held in the lookup cache");
}
