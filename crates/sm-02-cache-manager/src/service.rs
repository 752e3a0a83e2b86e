//! Cache manager over the shared store.

use mesh_telemetry::{CACHE_INVALIDATED_KEYS, CACHE_LOOKUPS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_store::SharedStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Typed JSON cache in the shared store.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn SharedStore>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

impl CacheManager {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Raw cached string. `None` covers both "never set" and "expired".
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.store.get(key).await {
            Ok(Some(value)) => {
                CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                Ok(Some(value))
            }
            Ok(None) => {
                CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                Ok(None)
            }
            Err(e) => {
                CACHE_LOOKUPS.with_label_values(&["error"]).inc();
                Err(e.into())
            }
        }
    }

    /// Cached value decoded as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CacheError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    /// Store `value` under `key` for `ttl`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set_ex(key, &raw, ttl).await?;
        debug!(key, ttl_secs = ttl.as_secs(), "Cache entry stored");
        Ok(())
    }

    /// Drop a single entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.store.delete(&[key.to_string()]).await?;
        CACHE_INVALIDATED_KEYS.inc_by(removed);
        Ok(removed > 0)
    }

    /// Drop every entry whose key starts with `prefix`.
    ///
    /// Returns the number of keys removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        if prefix.is_empty() {
            return Err(CacheError::EmptyPrefix);
        }
        let keys = self.store.keys_with_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(&keys).await?;
        CACHE_INVALIDATED_KEYS.inc_by(removed);
        debug!(prefix, matched = keys.len(), removed, "Cache prefix invalidated");
        Ok(removed)
    }

    /// Read-through lookup.
    ///
    /// On a miss (or an unreadable cache) `load` runs against the
    /// system-of-record and its value is cached for `ttl`. Cache failures
    /// never fail the lookup; only `load` can.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Cache read failed, loading from source"),
        }

        let value = load().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key, error = %e, "Cache write failed, serving uncached value");
        }
        Ok(value)
    }
}
