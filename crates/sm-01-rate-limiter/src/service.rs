//! # Rate Limiter Service
//!
//! Fixed-window admission over the shared store. One instance is built at
//! startup and shared by every route; the budget travels with each call.

use async_trait::async_trait;
use mesh_telemetry::RATE_LIMIT_DECISIONS;
use shared_store::SharedStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::domain::{Decision, RateLimitError, RateLimitKey, RoutePolicy};
use crate::ports::RateLimiterApi;

/// Smallest retry hint handed out, so a rejection never says "retry now".
const MIN_RETRY_AFTER: Duration = Duration::from_millis(1);

/// Shared-store backed [`RateLimiterApi`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimiterApi for RateLimiter {
    async fn admit(
        &self,
        key: &RateLimitKey,
        capacity: u32,
        window: Duration,
    ) -> Result<Decision, RateLimitError> {
        RoutePolicy::new(key.scope.as_str(), capacity, window).validate()?;

        let consumption = match self
            .store
            .consume_window(&key.store_key(), capacity, window)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!(key = %key, error = %e, "Rate limiter store failure, failing closed");
                RATE_LIMIT_DECISIONS
                    .with_label_values(&[key.scope.as_str(), "error"])
                    .inc();
                return Err(e.into());
            }
        };

        let decision = if consumption.admitted {
            Decision::Allowed {
                remaining: consumption.remaining,
            }
        } else {
            Decision::Rejected {
                retry_after: consumption.resets_in.max(MIN_RETRY_AFTER),
            }
        };

        let outcome = if decision.is_allowed() { "allowed" } else { "rejected" };
        RATE_LIMIT_DECISIONS
            .with_label_values(&[key.scope.as_str(), outcome])
            .inc();
        debug!(key = %key, capacity, ?decision, "Admission decided");
        Ok(decision)
    }
}
