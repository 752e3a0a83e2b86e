//! Core rate-limiting entities.

use std::fmt;
use std::time::Duration;

/// Prefix of every rate-limit counter in the shared store.
pub const KEY_PREFIX: &str = "ratelimit:";

/// Subject used when no identity or address can be derived.
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Identity of one counter: who is acting, and on what.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// User id when authenticated, otherwise a network address.
    pub subject: String,
    /// Logical operation, e.g. `post:create`.
    pub scope: String,
}

impl RateLimitKey {
    pub fn new(subject: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scope: scope.into(),
        }
    }

    /// Key of the counter in the shared store: `ratelimit:<scope>:<subject>`.
    #[must_use]
    pub fn store_key(&self) -> String {
        format!("{KEY_PREFIX}{}:{}", self.scope, self.subject)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.scope)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Admitted; `remaining` points are left in the current window.
    Allowed { remaining: u32 },
    /// Budget exhausted; the window closes after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Whole seconds for a `Retry-After` header, rounded up and at least 1.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::Rejected { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}
