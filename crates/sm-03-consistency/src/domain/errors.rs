use shared_bus::HandlerError;
use shared_store::StoreError;
use shared_types::EventError;
use sm_02_cache_manager::CacheError;
use thiserror::Error;

/// Failures while applying a consistency effect.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The event could not be decoded. Never retried.
    #[error("undecodable event: {0}")]
    Decode(#[from] EventError),

    /// The event decoded but is not one this consumer handles.
    #[error("unexpected event type: {0}")]
    Unexpected(String),

    #[error("idempotency store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("cache invalidation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("search index unavailable: {0}")]
    Index(String),

    #[error("media storage unavailable: {0}")]
    Storage(String),
}

impl CoordinatorError {
    /// Whether redelivery could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Decode(_) | Self::Unexpected(_))
    }
}

impl From<CoordinatorError> for HandlerError {
    fn from(e: CoordinatorError) -> Self {
        if e.is_transient() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}
