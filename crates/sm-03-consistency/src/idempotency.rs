//! Processed-event markers in the shared store.
//!
//! Markers live under `processed:<namespace>:<idempotencyKey>`. They are
//! shared by every instance of a consuming service, so an event redelivered
//! to a different instance is still recognised.

use shared_store::{SharedStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// How long a processed marker is kept.
pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn SharedStore>,
    namespace: String,
    ttl: Duration,
}

impl std::fmt::Debug for IdempotencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGuard")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn SharedStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl: DEFAULT_MARKER_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn marker(&self, key: &str) -> String {
        format!("processed:{}:{key}", self.namespace)
    }

    /// Whether the effect for `key` has already been applied.
    pub async fn is_applied(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&self.marker(key)).await?.is_some())
    }

    /// Record that the effect for `key` has been applied.
    pub async fn mark_applied(&self, key: &str) -> Result<(), StoreError> {
        self.store.set_ex(&self.marker(key), "1", self.ttl).await
    }
}
