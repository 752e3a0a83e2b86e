//! The post service's system-of-record.

use async_trait::async_trait;
use shared_types::{Post, PostId, UserId};

use crate::error::ServiceError;

/// Post store.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: Post) -> Result<(), ServiceError>;

    async fn get(&self, id: &PostId) -> Result<Option<Post>, ServiceError>;

    /// Delete `id` only if it belongs to `owner`, returning the deleted post.
    /// A post owned by someone else is reported as absent.
    async fn delete_owned(&self, id: &PostId, owner: &UserId)
        -> Result<Option<Post>, ServiceError>;

    /// One page of posts, newest first, plus the total count.
    async fn page(&self, offset: usize, limit: usize) -> Result<(Vec<Post>, usize), ServiceError>;
}
