//! # Mesh Telemetry
//!
//! Observability for the social-mesh services.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, pretty in
//!   development and JSON in containers so a log shipper can parse them.
//! - **Metrics**: Prometheus counters for rate-limit decisions, cache
//!   lookups and bus deliveries, exposed in text format on `/metrics`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("post-service");
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MESH_SERVICE` | `social-mesh` | Service name attached to every log line |
//! | `MESH_LOG_LEVEL` | `info` | Log level filter (overridden by `RUST_LOG`) |
//! | `MESH_JSON_LOGS` | `false` (`true` in containers) | Emit JSON log lines |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, BUS_DELIVERIES, BUS_MESSAGES_PUBLISHED,
    CACHE_INVALIDATED_KEYS, CACHE_LOOKUPS, DEAD_LETTERS, RATE_LIMIT_DECISIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}
