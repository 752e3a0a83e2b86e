//! # Event Bus Delivery
//!
//! Delivery semantics seen from the consuming services: fan-out across
//! services, load sharing inside one service, bounded retry and
//! dead-lettering.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shared_bus::{
        queue_name, Broker, BusPublisher, EventHandler, EventPublisher, HandlerError,
        InMemoryBroker, Subscriber, SubscriptionConfig,
    };
    use shared_types::{DomainEvent, PostDeleted, PostId, UserId};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::integration::eventually;

    /// Records the idempotency key of every event it handles.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_with: Mutex<Option<HandlerError>>,
    }

    impl Recorder {
        fn failing(error: HandlerError) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_with: Mutex::new(Some(error)),
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError> {
            self.seen.lock().push(event.idempotency_key);
            match self.fail_with.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn config() -> SubscriptionConfig {
        SubscriptionConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(5),
            op_timeout: Duration::from_secs(1),
        }
    }

    fn deleted(post: &str) -> DomainEvent {
        DomainEvent::new(&PostDeleted {
            post_id: PostId::new(post),
            user_id: UserId::new("u1"),
            media_ids: vec![],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_each_service_gets_its_own_copy() {
        let broker = Arc::new(InMemoryBroker::new());
        let subscriber = Subscriber::new(broker.clone(), config());
        let search = Arc::new(Recorder::default());
        let media = Arc::new(Recorder::default());

        let s1 = subscriber
            .subscribe("post.deleted", &queue_name("search-service", "post.deleted"), search.clone())
            .await
            .unwrap();
        let s2 = subscriber
            .subscribe("post.deleted", &queue_name("media-service", "post.deleted"), media.clone())
            .await
            .unwrap();

        let publisher = BusPublisher::new(broker.clone());
        publisher.publish(&deleted("p1")).await.unwrap();

        eventually(|| search.count() == 1 && media.count() == 1).await;
        s1.shutdown().await;
        s2.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_instances_of_one_service_share_the_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let queue = queue_name("search-service", "post.deleted");
        let instance_a = Arc::new(Recorder::default());
        let instance_b = Arc::new(Recorder::default());

        let sa = Subscriber::new(broker.clone(), config())
            .subscribe("post.deleted", &queue, instance_a.clone())
            .await
            .unwrap();
        let sb = Subscriber::new(broker.clone(), config())
            .subscribe("post.deleted", &queue, instance_b.clone())
            .await
            .unwrap();

        let publisher = BusPublisher::new(broker.clone());
        for i in 0..20 {
            publisher.publish(&deleted(&format!("p{i}"))).await.unwrap();
        }

        eventually(|| instance_a.count() + instance_b.count() == 20).await;

        let mut handled: Vec<String> = instance_a.seen.lock().clone();
        handled.extend(instance_b.seen.lock().iter().cloned());
        let distinct: HashSet<&String> = handled.iter().collect();
        assert_eq!(distinct.len(), 20, "every event handled exactly once");

        sa.shutdown().await;
        sb.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failures_end_in_dead_letter() {
        let broker = Arc::new(InMemoryBroker::new());
        let queue = queue_name("media-service", "post.deleted");
        let handler = Recorder::failing(HandlerError::Transient("object storage down".into()));
        let sub = Subscriber::new(broker.clone(), config())
            .subscribe("post.deleted", &queue, handler.clone())
            .await
            .unwrap();

        BusPublisher::new(broker.clone())
            .publish(&deleted("p1"))
            .await
            .unwrap();

        eventually(|| broker.dead_letter_count(&queue) == 1).await;
        assert_eq!(handler.count(), 3);

        let dead = broker.dead_letters(&queue).await.unwrap();
        assert_eq!(dead[0].attempts, 3);
        assert!(dead[0].reason.contains("object storage down"));

        // Never retried automatically afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.count(), 3);
        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let broker = Arc::new(InMemoryBroker::new());
        let queue = queue_name("search-service", "post.deleted");
        let handler = Recorder::failing(HandlerError::Permanent("bad payload".into()));
        let sub = Subscriber::new(broker.clone(), config())
            .subscribe("post.deleted", &queue, handler.clone())
            .await
            .unwrap();

        BusPublisher::new(broker.clone())
            .publish(&deleted("p1"))
            .await
            .unwrap();

        eventually(|| broker.dead_letter_count(&queue) == 1).await;
        assert_eq!(handler.count(), 1);
        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_message_skips_the_handler() {
        let broker = Arc::new(InMemoryBroker::new());
        let queue = queue_name("search-service", "post.created");
        let handler = Arc::new(Recorder::default());
        let sub = Subscriber::new(broker.clone(), config())
            .subscribe("post.created", &queue, handler.clone())
            .await
            .unwrap();

        BusPublisher::new(broker.clone())
            .publish_raw("post.created", b"{not json".to_vec())
            .await
            .unwrap();

        eventually(|| broker.dead_letter_count(&queue) == 1).await;
        assert_eq!(handler.count(), 0);
        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscription_created_after_publish_still_receives() {
        let broker = Arc::new(InMemoryBroker::new());
        BusPublisher::new(broker.clone())
            .publish(&deleted("p1"))
            .await
            .unwrap();

        let late = Arc::new(Recorder::default());
        let sub = Subscriber::new(broker.clone(), config())
            .subscribe("post.deleted", "late-service.post.deleted", late.clone())
            .await
            .unwrap();

        eventually(|| late.count() == 1).await;
        sub.shutdown().await;
    }
}
