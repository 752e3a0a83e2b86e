//! Route-level budgets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::RateLimitError;

/// Budget for one action scope, fixed when the route is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub scope: String,
    pub capacity: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RoutePolicy {
    pub fn new(scope: impl Into<String>, capacity: u32, window: Duration) -> Self {
        Self {
            scope: scope.into(),
            capacity,
            window,
        }
    }

    /// Reject budgets that could never admit anything.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.capacity == 0 {
            return Err(self.invalid("capacity must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(self.invalid("window must be non-zero"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> RateLimitError {
        RateLimitError::InvalidPolicy {
            scope: self.scope.clone(),
            reason: reason.to_string(),
        }
    }
}
