//! Search service consumer of `post.created` and `post.deleted`.
//!
//! The two topics are consumed by separate tasks, so a create and a delete
//! of the same post may be handled concurrently. A delete writes the post's
//! tombstone before it removes the record; a create checks the tombstone
//! again after its upsert and undoes the upsert if one appeared. Whichever
//! side runs second therefore leaves the record absent.

use async_trait::async_trait;
use shared_bus::{EventHandler, HandlerError};
use shared_types::cache_keys::{POSTS_PREFIX, SEARCH_PREFIX};
use shared_types::{DomainEvent, EventType, PostCreated, PostDeleted, PostId};
use sm_02_cache_manager::CacheManager;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{invalidate_all, Effect};
use crate::domain::{CoordinatorError, SearchRecord};
use crate::idempotency::IdempotencyGuard;
use crate::ports::SearchIndex;

/// Cache namespaces holding views of posts or search results.
#[must_use]
pub fn default_prefixes() -> Vec<String> {
    vec![SEARCH_PREFIX.to_string(), POSTS_PREFIX.to_string()]
}

/// Marker key recording that `post_id` was deleted.
fn tombstone(post_id: &PostId) -> String {
    format!("tombstone:{post_id}")
}

/// Mirrors post lifecycle events into the search index.
pub struct SearchIndexCoordinator {
    index: Arc<dyn SearchIndex>,
    cache: CacheManager,
    guard: IdempotencyGuard,
    prefixes: Vec<String>,
}

impl SearchIndexCoordinator {
    pub fn new(index: Arc<dyn SearchIndex>, cache: CacheManager, guard: IdempotencyGuard) -> Self {
        Self {
            index,
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
        if self.guard.is_applied(&event.idempotency_key).await? {
            debug!(key = %event.idempotency_key, "Duplicate event skipped");
            return Ok(Effect::Duplicate);
        }

        let effect = match event.event_type {
            EventType::PostCreated => self.index_post(event.decode()?).await?,
            EventType::PostDeleted => {
                let payload: PostDeleted = event.decode()?;
                self.guard.mark_applied(&tombstone(&payload.post_id)).await?;
                let existed = self.index.remove(&payload.post_id).await?;
                info!(post_id = %payload.post_id, existed, "Search record removed");
                Effect::Applied
            }
        };

        invalidate_all(&self.cache, &self.prefixes).await?;
        self.guard.mark_applied(&event.idempotency_key).await?;
        Ok(effect)
    }

    async fn index_post(&self, payload: PostCreated) -> Result<Effect, CoordinatorError> {
        let post_id = payload.post_id.clone();
        let tombstone = tombstone(&post_id);
        if self.guard.is_applied(&tombstone).await? {
            info!(post_id = %post_id, "Post already deleted, not indexing");
            return Ok(Effect::Superseded);
        }

        self.index.upsert(SearchRecord::from(payload)).await?;

        // A delete may have finished while the upsert was in flight.
        if self.guard.is_applied(&tombstone).await? {
            self.index.remove(&post_id).await?;
            info!(post_id = %post_id, "Post deleted during indexing, record withdrawn");
            return Ok(Effect::Superseded);
        }

        info!(post_id = %post_id, "Search record indexed");
        Ok(Effect::Applied)
    }
}

#[async_trait]
impl EventHandler for SearchIndexCoordinator {
    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
        self.apply(&event).await.map(|_| ()).map_err(|e| {
            warn!(key = %event.idempotency_key, error = %e, "Search consumer failed");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySearchIndex;
    use chrono::Utc;
    use shared_store::{InMemoryStore, SharedStore};
    use shared_types::{PostId, UserId};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        index: Arc<InMemorySearchIndex>,
        coordinator: SearchIndexCoordinator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let coordinator = SearchIndexCoordinator::new(
            index.clone(),
            CacheManager::new(store.clone()),
            IdempotencyGuard::new(store.clone(), "search-service"),
        );
        Fixture {
            store,
            index,
            coordinator,
        }
    }

    fn created(id: &str, content: &str) -> DomainEvent {
        DomainEvent::new(&PostCreated {
            post_id: PostId::new(id),
            user_id: UserId::new("u1"),
            content: content.into(),
            created_at: Utc::now(),
        })
        .unwrap()
    }

    fn deleted(id: &str) -> DomainEvent {
        DomainEvent::new(&PostDeleted {
            post_id: PostId::new(id),
            user_id: UserId::new("u1"),
            media_ids: vec![],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_redelivered_create_matches_single_delivery() {
        let f = fixture();
        let event = created("p1", "hello rust");

        assert_eq!(f.coordinator.apply(&event).await.unwrap(), Effect::Applied);
        let once = f.index.get(&PostId::new("p1")).await.unwrap();

        assert_eq!(f.coordinator.apply(&event).await.unwrap(), Effect::Duplicate);
        assert_eq!(f.index.get(&PostId::new("p1")).await.unwrap(), once);
        assert_eq!(f.index.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_absent_record_is_ok() {
        let f = fixture();
        assert_eq!(f.coordinator.apply(&deleted("p1")).await.unwrap(), Effect::Applied);
        assert!(f.index.is_empty());
    }

    #[tokio::test]
    async fn test_create_after_delete_does_not_resurrect() {
        let f = fixture();
        f.coordinator.apply(&created("p1", "x")).await.unwrap();
        f.coordinator.apply(&deleted("p1")).await.unwrap();
        assert!(f.index.is_empty());

        // A late copy of post.created that was never marked on this side
        let late = created("p2", "y");
        f.coordinator.apply(&deleted("p2")).await.unwrap();
        assert_eq!(f.coordinator.apply(&late).await.unwrap(), Effect::Superseded);
        assert!(f.index.is_empty());
    }

    #[tokio::test]
    async fn test_search_cache_invalidated_after_effect() {
        let f = fixture();
        f.store
            .set_ex("search:hello", "[]", Duration::from_secs(180))
            .await
            .unwrap();
        f.store
            .set_ex("posts:1:10", "[]", Duration::from_secs(300))
            .await
            .unwrap();

        f.coordinator.apply(&created("p1", "hello")).await.unwrap();
        assert_eq!(f.store.get("search:hello").await.unwrap(), None);
        assert_eq!(f.store.get("posts:1:10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_post_list_views_dropped_after_delete() {
        let f = fixture();
        f.store
            .set_ex("posts:1:10", "[stale]", Duration::from_secs(300))
            .await
            .unwrap();

        f.coordinator.apply(&deleted("p1")).await.unwrap();
        assert_eq!(f.store.get("posts:1:10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_configured_prefixes_replace_defaults() {
        let f = fixture();
        let coordinator = SearchIndexCoordinator::new(
            f.index.clone(),
            CacheManager::new(f.store.clone()),
            IdempotencyGuard::new(f.store.clone(), "search-service"),
        )
        .with_invalidated_prefixes(vec!["search:".into()]);
        f.store
            .set_ex("posts:1:10", "[]", Duration::from_secs(300))
            .await
            .unwrap();

        coordinator.apply(&created("p1", "x")).await.unwrap();
        assert_eq!(coordinator.invalidated_prefixes(), ["search:".to_string()]);
        assert!(f.store.get("posts:1:10").await.unwrap().is_some());
    }

    /// Index whose upserts take a while to land.
    struct SlowIndex {
        inner: InMemorySearchIndex,
        delay: Duration,
    }

    #[async_trait]
    impl SearchIndex for SlowIndex {
        async fn upsert(&self, record: SearchRecord) -> Result<(), CoordinatorError> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert(record).await
        }

        async fn remove(&self, post_id: &PostId) -> Result<bool, CoordinatorError> {
            self.inner.remove(post_id).await
        }

        async fn get(&self, post_id: &PostId) -> Result<Option<SearchRecord>, CoordinatorError> {
            self.inner.get(post_id).await
        }

        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SearchRecord>, CoordinatorError> {
            self.inner.search(query, limit).await
        }
    }

    #[tokio::test]
    async fn test_delete_during_slow_upsert_leaves_no_record() {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(SlowIndex {
            inner: InMemorySearchIndex::new(),
            delay: Duration::from_millis(100),
        });
        let coordinator = Arc::new(SearchIndexCoordinator::new(
            index.clone(),
            CacheManager::new(store.clone()),
            IdempotencyGuard::new(store, "search-service"),
        ));

        let creating = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.apply(&created("p1", "gone soon")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.apply(&deleted("p1")).await.unwrap(), Effect::Applied);

        let effect = creating.await.unwrap().unwrap();
        assert_eq!(effect, Effect::Superseded);
        assert!(index.get(&PostId::new("p1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_outage_is_transient_and_not_marked() {
        let f = fixture();
        f.index.set_available(false);
        let event = created("p1", "x");

        let err = f.coordinator.handle(event.clone()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Transient(_)));

        f.index.set_available(true);
        assert_eq!(f.coordinator.apply(&event).await.unwrap(), Effect::Applied);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_permanent() {
        let f = fixture();
        let mut event = created("p1", "x");
        event.payload = serde_json::json!({ "postId": 42 });

        let err = f.coordinator.handle(event).await.unwrap_err();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }
}
