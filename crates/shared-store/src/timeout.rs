//! # Timeout Decorator
//!
//! Bounds every call of an inner [`SharedStore`]. A call that does not
//! complete in time fails with [`StoreError::Timeout`]; callers treat it
//! exactly like an unreachable store.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::ports::{SharedStore, StoreError, WindowConsumption};

/// [`SharedStore`] wrapper applying a per-operation timeout.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: SharedStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Shared store call timed out"
                );
                Err(StoreError::Timeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<S: SharedStore> SharedStore for TimeoutStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("set_ex", self.inner.set_ex(key, value, ttl)).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.bounded("delete", self.inner.delete(keys)).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("keys_with_prefix", self.inner.keys_with_prefix(prefix))
            .await
    }

    async fn consume_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowConsumption, StoreError> {
        self.bounded(
            "consume_window",
            self.inner.consume_window(key, capacity, window),
        )
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", self.inner.ping()).await
    }
}
