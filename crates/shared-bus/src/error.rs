use std::time::Duration;
use thiserror::Error;

/// Errors from broker operations.
///
/// All of these are infrastructure failures; none of them says anything
/// about the content of a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A broker round-trip exceeded its bound.
    #[error("broker operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The broker was shut down.
    #[error("broker closed")]
    Closed,

    /// Consuming from a queue that was never declared.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// An event could not be encoded for publication.
    #[error("failed to encode event: {0}")]
    Serialization(String),
}

impl BusError {
    /// Whether retrying the operation later might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

impl From<shared_types::EventError> for BusError {
    fn from(e: shared_types::EventError) -> Self {
        Self::Serialization(e.to_string())
    }
}
