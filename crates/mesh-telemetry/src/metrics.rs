//! Prometheus metrics for social-mesh services.
//!
//! All metrics follow the naming convention: `mesh_<component>_<metric>_total`

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // RATE LIMITER
    // =========================================================================

    /// Admission decisions by scope and outcome (allowed/rejected/error)
    pub static ref RATE_LIMIT_DECISIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("mesh_rate_limit_decisions_total", "Rate limiter admission decisions"),
        &["scope", "outcome"]
    ).expect("metric creation failed");

    // =========================================================================
    // CACHE MANAGER
    // =========================================================================

    /// Cache lookups by result (hit/miss/error)
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("mesh_cache_lookups_total", "Cache lookups by result"),
        &["result"]
    ).expect("metric creation failed");

    /// Keys removed by invalidation
    pub static ref CACHE_INVALIDATED_KEYS: IntCounter = IntCounter::new(
        "mesh_cache_invalidated_keys_total",
        "Cache keys removed by invalidation"
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    /// Messages published by topic
    pub static ref BUS_MESSAGES_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("mesh_bus_messages_published_total", "Messages published to the bus"),
        &["topic"]
    ).expect("metric creation failed");

    /// Delivery outcomes by queue (acked/requeued/dead_lettered)
    pub static ref BUS_DELIVERIES: IntCounterVec = IntCounterVec::new(
        Opts::new("mesh_bus_deliveries_total", "Delivery outcomes per durable queue"),
        &["queue", "outcome"]
    ).expect("metric creation failed");

    /// Messages routed to a dead-letter destination
    pub static ref DEAD_LETTERS: IntCounterVec = IntCounterVec::new(
        Opts::new("mesh_dead_letters_total", "Messages dead-lettered per queue"),
        &["queue"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RATE_LIMIT_DECISIONS.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(CACHE_INVALIDATED_KEYS.clone()),
        Box::new(BUS_MESSAGES_PUBLISHED.clone()),
        Box::new(BUS_DELIVERIES.clone()),
        Box::new(DEAD_LETTERS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
