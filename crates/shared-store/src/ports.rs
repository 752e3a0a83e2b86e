//! # Store Port
//!
//! The subset of the store protocol the services rely on.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from store operations.
///
/// Every variant is an infrastructure failure. None of them means "the
/// client exceeded its budget".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the command.
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    /// The round-trip exceeded its bound.
    #[error("shared store operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The store answered with something the client cannot interpret.
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Outcome of consuming one point from a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConsumption {
    /// Whether a point was available and has been consumed.
    pub admitted: bool,
    /// Points left in the current window after this call.
    pub remaining: u32,
    /// Time until the current window ends.
    pub resets_in: Duration,
}

/// Shared key/value store client.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// `GET key`. Expired keys are indistinguishable from absent ones.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// `DEL key...`. Returns how many keys existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Enumerate live keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically consume one point of a fixed window.
    ///
    /// If `key` holds no live window, a new one of length `window` starts
    /// now with `capacity - 1` points left. Otherwise one point is taken if
    /// any remain. Concurrent callers on the same key are serialized by the
    /// store, so two calls can never both take the last point.
    async fn consume_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowConsumption, StoreError>;

    /// Round-trip health check.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SharedStore + ?Sized> SharedStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_ex(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        (**self).delete(keys).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_with_prefix(prefix).await
    }

    async fn consume_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowConsumption, StoreError> {
        (**self).consume_window(key, capacity, window).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
