//! # Post Events Reaching Derived State
//!
//! A full runtime hosting every service over in-memory backends. Posts are
//! written through the post service; search and media state is only ever
//! changed by the consumers.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use service_runtime::{MeshConfig, NewPost, Repositories, ServiceRole, ServiceRuntime};
    use shared_bus::{queue_name, BusPublisher, EventPublisher, InMemoryBroker};
    use shared_store::InMemoryStore;
    use shared_types::{DomainEvent, MediaId, Post, PostCreated, PostDeleted, PostId, UserId};
    use sm_03_consistency::{
        InMemoryMediaRepository, InMemoryObjectStorage, InMemorySearchIndex, MediaRecord,
        MediaRepository, SearchIndex,
    };
    use std::sync::Arc;
    use std::time::Duration;

    use crate::integration::{eventually, eventually_async};

    struct Mesh {
        runtime: ServiceRuntime,
        broker: Arc<InMemoryBroker>,
        index: Arc<InMemorySearchIndex>,
        media: Arc<InMemoryMediaRepository>,
        objects: Arc<InMemoryObjectStorage>,
    }

    async fn mesh_with(config: MeshConfig) -> Mesh {
        let broker = Arc::new(InMemoryBroker::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let media = Arc::new(InMemoryMediaRepository::new());
        let objects = Arc::new(InMemoryObjectStorage::new());
        let repositories = Repositories {
            search_index: index.clone(),
            media: media.clone(),
            objects: objects.clone(),
            ..Repositories::in_memory()
        };

        let runtime = ServiceRuntime::with_backends(
            config,
            Arc::new(InMemoryStore::new()),
            broker.clone(),
            repositories,
        )
        .await
        .unwrap();
        runtime.start().await.unwrap();

        Mesh {
            runtime,
            broker,
            index,
            media,
            objects,
        }
    }

    async fn mesh() -> Mesh {
        mesh_with(MeshConfig {
            service: ServiceRole::All,
            ..MeshConfig::default()
        })
        .await
    }

    async fn upload(mesh: &Mesh, id: &str, owner: &str) -> MediaId {
        let public_id = format!("obj-{id}");
        mesh.objects.put(public_id.clone());
        mesh.media
            .insert(MediaRecord {
                id: MediaId::new(id),
                user_id: UserId::new(owner),
                public_id: public_id.clone(),
                url: format!("https://cdn.example/{public_id}"),
                original_name: format!("{id}.png"),
                mime_type: "image/png".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        MediaId::new(id)
    }

    async fn create(mesh: &Mesh, author: &str, content: &str, media_ids: Vec<MediaId>) -> Post {
        mesh.runtime
            .services()
            .posts
            .as_ref()
            .unwrap()
            .create_post(
                UserId::new(author),
                NewPost {
                    content: content.into(),
                    media_ids,
                },
            )
            .await
            .unwrap()
    }

    async fn wait_indexed(index: &Arc<InMemorySearchIndex>, post_id: &PostId, present: bool) {
        eventually_async(|| {
            let index = index.clone();
            let post_id = post_id.clone();
            async move { index.get(&post_id).await.unwrap().is_some() == present }
        })
        .await;
    }

    #[tokio::test]
    async fn test_created_post_becomes_searchable() {
        let mesh = mesh().await;
        let post = create(&mesh, "u1", "learning rust", vec![]).await;

        wait_indexed(&mesh.index, &post.id, true).await;

        let hits = mesh
            .runtime
            .services()
            .search
            .as_ref()
            .unwrap()
            .search("rust")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].post_id, post.id);
        mesh.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_deleted_post_cleans_search_and_media() {
        let mesh = mesh().await;
        let m1 = upload(&mesh, "m1", "u1").await;
        let m2 = upload(&mesh, "m2", "u1").await;
        let post = create(&mesh, "u1", "holiday photos", vec![m1.clone(), m2.clone()]).await;
        wait_indexed(&mesh.index, &post.id, true).await;

        mesh.runtime
            .services()
            .posts
            .as_ref()
            .unwrap()
            .delete_post(&UserId::new("u1"), &post.id)
            .await
            .unwrap();

        wait_indexed(&mesh.index, &post.id, false).await;
        let objects = mesh.objects.clone();
        eventually(|| !objects.contains("obj-m1") && !objects.contains("obj-m2")).await;
        eventually_async(|| {
            let media = mesh.media.clone();
            async move { media.list().await.unwrap().is_empty() }
        })
        .await;
        mesh.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_media_of_other_users_survives_post_delete() {
        let mesh = mesh().await;
        let own = upload(&mesh, "m1", "u1").await;
        let foreign = upload(&mesh, "m9", "u2").await;
        let post = create(&mesh, "u1", "mixed", vec![own.clone(), foreign.clone()]).await;
        wait_indexed(&mesh.index, &post.id, true).await;

        mesh.runtime
            .services()
            .posts
            .as_ref()
            .unwrap()
            .delete_post(&UserId::new("u1"), &post.id)
            .await
            .unwrap();

        let objects = mesh.objects.clone();
        eventually(|| !objects.contains("obj-m1")).await;
        assert!(mesh.objects.contains("obj-m9"));
        assert!(mesh.media.get(&foreign).await.unwrap().is_some());
        mesh.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_redelivered_events_do_not_change_the_outcome() {
        let mesh = mesh().await;
        let m1 = upload(&mesh, "m1", "u1").await;
        let post = create(&mesh, "u1", "short lived", vec![m1]).await;
        wait_indexed(&mesh.index, &post.id, true).await;
        mesh.runtime
            .services()
            .posts
            .as_ref()
            .unwrap()
            .delete_post(&UserId::new("u1"), &post.id)
            .await
            .unwrap();
        wait_indexed(&mesh.index, &post.id, false).await;

        // A stale create for the deleted post arrives again, followed by a
        // sentinel on the same queue; queues are FIFO per consumer.
        let publisher = BusPublisher::new(mesh.broker.clone());
        let stale = DomainEvent::new(&PostCreated {
            post_id: post.id.clone(),
            user_id: UserId::new("u1"),
            content: post.content.clone(),
            created_at: post.created_at,
        })
        .unwrap();
        publisher.publish(&stale).await.unwrap();
        let sentinel = create(&mesh, "u2", "sentinel", vec![]).await;
        wait_indexed(&mesh.index, &sentinel.id, true).await;

        assert!(mesh.index.get(&post.id).await.unwrap().is_none());
        assert_eq!(mesh.index.len(), 1);
        assert_eq!(
            mesh.broker
                .dead_letter_count(&queue_name("search-service", "post.created")),
            0
        );
        mesh.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_index_outage_recovers_through_retry() {
        let mut config = MeshConfig {
            service: ServiceRole::All,
            ..MeshConfig::default()
        };
        config.bus.retry_backoff = Duration::from_millis(300);
        let mesh = mesh_with(config).await;

        mesh.index.set_available(false);
        let post = create(&mesh, "u1", "written during outage", vec![]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mesh.index.is_empty());

        mesh.index.set_available(true);
        wait_indexed(&mesh.index, &post.id, true).await;
        assert_eq!(
            mesh.broker
                .dead_letter_count(&queue_name("search-service", "post.created")),
            0
        );
        mesh.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_of_unindexed_post_is_harmless() {
        let mesh = mesh().await;
        let ghost = PostId::new("never-indexed");
        let publisher = BusPublisher::new(mesh.broker.clone());
        publisher
            .publish(
                &DomainEvent::new(&PostDeleted {
                    post_id: ghost.clone(),
                    user_id: UserId::new("u1"),
                    media_ids: vec![MediaId::new("missing")],
                })
                .unwrap(),
            )
            .await
            .unwrap();

        // Sentinel behind it on the same queue.
        let sentinel = create(&mesh, "u1", "sentinel", vec![]).await;
        wait_indexed(&mesh.index, &sentinel.id, true).await;
        mesh.runtime
            .services()
            .posts
            .as_ref()
            .unwrap()
            .delete_post(&UserId::new("u1"), &sentinel.id)
            .await
            .unwrap();
        wait_indexed(&mesh.index, &sentinel.id, false).await;

        let deleted_queue = queue_name("search-service", "post.deleted");
        assert_eq!(mesh.broker.dead_letter_count(&deleted_queue), 0);
        mesh.runtime.shutdown().await;
    }
}
