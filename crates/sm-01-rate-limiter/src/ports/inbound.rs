//! Driving port for the rate limiter.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{Decision, RateLimitError, RateLimitKey, RoutePolicy};

/// Admission API used by HTTP layers and services.
#[async_trait]
pub trait RateLimiterApi: Send + Sync {
    /// Consume one point of `key`'s budget of `capacity` per `window`.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::Infrastructure`] when the shared store fails;
    /// [`RateLimitError::InvalidPolicy`] for a zero capacity or window.
    async fn admit(
        &self,
        key: &RateLimitKey,
        capacity: u32,
        window: Duration,
    ) -> Result<Decision, RateLimitError>;

    /// [`admit`](Self::admit) with the budget of `policy`.
    async fn check(&self, policy: &RoutePolicy, subject: &str) -> Result<Decision, RateLimitError> {
        let key = RateLimitKey::new(subject, policy.scope.as_str());
        self.admit(&key, policy.capacity, policy.window).await
    }
}
