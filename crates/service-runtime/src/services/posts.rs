//! Post service: the system-of-record writer.
//!
//! Every write runs in this order before the caller gets an answer:
//!
//! ```text
//! persist ──→ invalidate posts:<id> and posts:* ──→ publish event ──→ respond
//! ```
//!
//! There is no transaction across the three steps. If publishing fails the
//! write stands and the request reports a 503; consumers catch up on the
//! next event for that post or through cache expiry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared_bus::EventPublisher;
use shared_types::cache_keys::{self, POSTS_PREFIX};
use shared_types::{DomainEvent, MediaId, Post, PostCreated, PostDeleted, PostId, UserId};
use sm_02_cache_manager::CacheManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ServiceError;
use crate::ports::PostRepository;

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub media_ids: Vec<MediaId>,
}

/// One page of the post listing, as cached under `posts:<page>:<limit>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_posts: u32,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    cache: CacheManager,
    publisher: Arc<dyn EventPublisher>,
    list_ttl: Duration,
    single_ttl: Duration,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        cache: CacheManager,
        publisher: Arc<dyn EventPublisher>,
        list_ttl: Duration,
        single_ttl: Duration,
    ) -> Self {
        Self {
            posts,
            cache,
            publisher,
            list_ttl,
            single_ttl,
        }
    }

    pub async fn create_post(&self, author: UserId, input: NewPost) -> Result<Post, ServiceError> {
        if input.content.trim().is_empty() {
            return Err(ServiceError::Validation("content must not be empty".into()));
        }

        let post = Post {
            id: PostId::generate(),
            user_id: author,
            content: input.content,
            media_ids: input.media_ids,
            created_at: Utc::now(),
        };
        self.posts.insert(post.clone()).await?;
        self.invalidate(&post.id).await?;

        let event = DomainEvent::new(&PostCreated {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            content: post.content.clone(),
            created_at: post.created_at,
        })?;
        self.publish(&event).await?;

        info!(post_id = %post.id, user_id = %post.user_id, "Post created");
        Ok(post)
    }

    /// Delete a post owned by `requester`. Someone else's post is reported
    /// as not found.
    pub async fn delete_post(&self, requester: &UserId, id: &PostId) -> Result<(), ServiceError> {
        let Some(post) = self.posts.delete_owned(id, requester).await? else {
            return Err(ServiceError::NotFound("Post"));
        };
        self.invalidate(&post.id).await?;

        let event = DomainEvent::new(&PostDeleted {
            post_id: post.id.clone(),
            user_id: requester.clone(),
            media_ids: post.media_ids,
        })?;
        self.publish(&event).await?;

        info!(post_id = %post.id, user_id = %requester, "Post deleted");
        Ok(())
    }

    /// Newest-first page, read through `posts:<page>:<limit>`.
    pub async fn list_posts(&self, page: u32, limit: u32) -> Result<PostPage, ServiceError> {
        if page == 0 || limit == 0 {
            return Err(ServiceError::Validation(
                "page and limit must be at least 1".into(),
            ));
        }

        let key = cache_keys::post_list(page, limit);
        self.cache
            .get_or_load(&key, self.list_ttl, || async {
                let offset = (page as usize - 1).saturating_mul(limit as usize);
                let (posts, total) = self.posts.page(offset, limit as usize).await?;
                let total_posts = u32::try_from(total).unwrap_or(u32::MAX);
                Ok::<_, ServiceError>(PostPage {
                    posts,
                    current_page: page,
                    total_pages: total_posts.div_ceil(limit),
                    total_posts,
                })
            })
            .await
    }

    /// Single post, read through `posts:<id>`.
    pub async fn get_post(&self, id: &PostId) -> Result<Post, ServiceError> {
        self.cache
            .get_or_load(&cache_keys::single_post(id), self.single_ttl, || async {
                self.posts
                    .get(id)
                    .await?
                    .ok_or(ServiceError::NotFound("Post"))
            })
            .await
    }

    async fn invalidate(&self, id: &PostId) -> Result<(), ServiceError> {
        self.cache.invalidate(&cache_keys::single_post(id)).await?;
        self.cache.invalidate_prefix(POSTS_PREFIX).await?;
        Ok(())
    }

    async fn publish(&self, event: &DomainEvent) -> Result<(), ServiceError> {
        self.publisher.publish(event).await.map(|_| ()).map_err(|e| {
            error!(
                key = %event.idempotency_key,
                error = %e,
                "Post store updated but event not published"
            );
            e.into()
        })
    }
}
