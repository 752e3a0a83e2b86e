//! Driven ports: the stores the coordinators write derived state into.

use async_trait::async_trait;
use shared_types::{MediaId, PostId};

use crate::domain::{CoordinatorError, MediaRecord, SearchRecord};

/// Search service's index of posts.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or overwrite the record keyed by its `post_id`.
    async fn upsert(&self, record: SearchRecord) -> Result<(), CoordinatorError>;

    /// Remove the record for `post_id`. Returns whether one existed.
    async fn remove(&self, post_id: &PostId) -> Result<bool, CoordinatorError>;

    async fn get(&self, post_id: &PostId) -> Result<Option<SearchRecord>, CoordinatorError>;

    /// Records matching any term of `query`, best match first.
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<SearchRecord>, CoordinatorError>;
}

/// Media service's metadata store.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn insert(&self, record: MediaRecord) -> Result<(), CoordinatorError>;

    async fn get(&self, id: &MediaId) -> Result<Option<MediaRecord>, CoordinatorError>;

    /// Returns whether a record existed.
    async fn delete(&self, id: &MediaId) -> Result<bool, CoordinatorError>;

    async fn list(&self) -> Result<Vec<MediaRecord>, CoordinatorError>;
}

/// Blob storage holding the media bytes.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Delete the object at `public_id`. Deleting an absent object succeeds
    /// and returns `false`.
    async fn delete(&self, public_id: &str) -> Result<bool, CoordinatorError>;
}
