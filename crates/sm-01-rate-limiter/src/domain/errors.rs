use shared_store::StoreError;
use thiserror::Error;

/// Failures of an admission check.
///
/// A rejection is not an error; it is [`Decision::Rejected`](super::Decision).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The shared store could not answer. Callers must fail closed and
    /// report a server error, never a 429.
    #[error("rate limiter infrastructure unavailable: {0}")]
    Infrastructure(#[from] StoreError),

    /// Capacity or window is zero.
    #[error("invalid rate limit policy for '{scope}': {reason}")]
    InvalidPolicy { scope: String, reason: String },
}

impl RateLimitError {
    /// Whether the caller may retry later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
