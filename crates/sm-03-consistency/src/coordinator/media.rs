//! Media service consumer of `post.deleted`.
//!
//! Post views carry their `mediaIds`, so cleanup drops cached post views
//! along with the media listings.

use async_trait::async_trait;
use shared_bus::{EventHandler, HandlerError};
use shared_types::cache_keys::{MEDIA_PREFIX, POSTS_PREFIX};
use shared_types::{DomainEvent, EventType, MediaId, PostDeleted};
use sm_02_cache_manager::CacheManager;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{invalidate_all, Effect};
use crate::domain::CoordinatorError;
use crate::idempotency::IdempotencyGuard;
use crate::ports::{MediaRepository, ObjectStorage};

/// Cache namespaces holding media listings or posts that reference media.
#[must_use]
pub fn default_prefixes() -> Vec<String> {
    vec![MEDIA_PREFIX.to_string(), POSTS_PREFIX.to_string()]
}

/// Deletes the media attached to a deleted post.
pub struct MediaCleanupCoordinator {
    repository: Arc<dyn MediaRepository>,
    storage: Arc<dyn ObjectStorage>,
    cache: CacheManager,
    guard: IdempotencyGuard,
    prefixes: Vec<String>,
}

impl MediaCleanupCoordinator {
    pub fn new(
        repository: Arc<dyn MediaRepository>,
        storage: Arc<dyn ObjectStorage>,
        cache: CacheManager,
        guard: IdempotencyGuard,
    ) -> Self {
        Self {
            repository,
            storage,
            cache,
            guard,
            prefixes: default_prefixes(),
        }
    }

    /// Replace the cache namespaces invalidated after each effect.
    #[must_use]
    pub fn with_invalidated_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Namespaces invalidated after each effect.
    #[must_use]
    pub fn invalidated_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Apply the effect of `event`.
    pub async fn apply(&self, event: &DomainEvent) -> Result<Effect, CoordinatorError> {
        if event.event_type != EventType::PostDeleted {
            return Err(CoordinatorError::Unexpected(event.event_type.to_string()));
        }
        if self.guard.is_applied(&event.idempotency_key).await? {
            debug!(key = %event.idempotency_key, "Duplicate event skipped");
            return Ok(Effect::Duplicate);
        }

        let payload: PostDeleted = event.decode()?;
        let mut removed = 0usize;
        for media_id in &payload.media_ids {
            if self.remove_one(media_id, &payload).await? {
                removed += 1;
            }
        }
        info!(
            post_id = %payload.post_id,
            requested = payload.media_ids.len(),
            removed,
            "Media cleanup finished"
        );

        invalidate_all(&self.cache, &self.prefixes).await?;
        self.guard.mark_applied(&event.idempotency_key).await?;
        Ok(Effect::Applied)
    }

    /// Delete one media object and its metadata. Absent media is not an
    /// error; media owned by someone else is left alone.
    async fn remove_one(
        &self,
        media_id: &MediaId,
        payload: &PostDeleted,
    ) -> Result<bool, CoordinatorError> {
        let Some(record) = self.repository.get(media_id).await? else {
            debug!(media_id = %media_id, "Media already gone");
            return Ok(false);
        };

        if record.user_id != payload.user_id {
            warn!(
                media_id = %media_id,
                owner = %record.user_id,
                post_owner = %payload.user_id,
                "Media not owned by post author, skipping"
            );
            return Ok(false);
        }

        // Object first: if metadata went first, a crash would orphan the blob.
        self.storage.delete(&record.public_id).await?;
        self.repository.delete(media_id).await?;
        debug!(media_id = %media_id, public_id = %record.public_id, "Media deleted");
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for MediaCleanupCoordinator {
    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        self.apply(&event).await.map(|_| ()).map_err(|e| {
            warn!(key = %event.idempotency_key, error = %e, "Media consumer failed");
            e.into()
        })
    }
}
