use shared_store::StoreError;
use thiserror::Error;

/// Cache operation failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    /// A cached value could not be encoded or decoded.
    #[error("cache value for '{key}' could not be (de)serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Refused because it would match every key in the store.
    #[error("refusing to invalidate an empty prefix")]
    EmptyPrefix,
}
