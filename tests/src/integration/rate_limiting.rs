//! # Rate Limiting Across Processes
//!
//! Two limiter instances over one store stand in for two service processes:
//! the budget they enforce is shared, not per instance.

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use shared_store::{InMemoryStore, SharedStore};
    use shared_types::ManualClock;
    use sm_01_rate_limiter::{
        Decision, RateLimitError, RateLimitKey, RateLimitLayer, RateLimiter, RateLimiterApi,
        RoutePolicy,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const WINDOW: Duration = Duration::from_secs(60);

    fn shared_store() -> (Arc<InMemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (Arc::new(InMemoryStore::with_clock(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_post_create_scenario_across_two_instances() {
        let (store, clock) = shared_store();
        let instance_a = RateLimiter::new(store.clone());
        let instance_b = RateLimiter::new(store);
        let key = RateLimitKey::new("U1", "post:create");

        assert!(instance_a.admit(&key, 2, WINDOW).await.unwrap().is_allowed());
        assert!(instance_b.admit(&key, 2, WINDOW).await.unwrap().is_allowed());

        clock.advance(Duration::from_secs(1));
        match instance_a.admit(&key, 2, WINDOW).await.unwrap() {
            Decision::Rejected { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(59));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        clock.advance(Duration::from_secs(60));
        assert_eq!(
            instance_b.admit(&key, 2, WINDOW).await.unwrap(),
            Decision::Allowed { remaining: 1 }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_point_is_granted_once_across_instances() {
        let (store, _clock) = shared_store();
        let key = RateLimitKey::new("U1", "post:create");
        let warmup = RateLimiter::new(store.clone());
        warmup.admit(&key, 2, WINDOW).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limiter = RateLimiter::new(store.clone());
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                limiter.admit(&key, 2, WINDOW).await.unwrap().is_allowed()
            }));
        }

        let mut admitted = 0;
        for task in futures::future::join_all(tasks).await {
            if task.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_budgets_differ_per_scope() {
        let (store, _clock) = shared_store();
        let limiter = RateLimiter::new(store);

        for _ in 0..2 {
            assert!(limiter
                .check(&RoutePolicy::new("post:create", 2, WINDOW), "U1")
                .await
                .unwrap()
                .is_allowed());
        }
        assert!(!limiter
            .check(&RoutePolicy::new("post:create", 2, WINDOW), "U1")
            .await
            .unwrap()
            .is_allowed());

        // Reads have their own budget.
        assert!(limiter
            .check(&RoutePolicy::new("post:get", 60, WINDOW), "U1")
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_store_outage_is_not_a_rejection() {
        let (store, _clock) = shared_store();
        store.set_available(false);
        let limiter = RateLimiter::new(store);

        let err = limiter
            .admit(&RateLimitKey::new("U1", "post:create"), 2, WINDOW)
            .await
            .unwrap_err();
        assert!(matches!(err, RateLimitError::Infrastructure(_)));
        assert!(err.is_retryable());
    }

    fn guarded_app(store: Arc<InMemoryStore>) -> Router {
        let limiter: Arc<dyn RateLimiterApi> = Arc::new(RateLimiter::new(store));
        Router::new().route(
            "/api/posts/create-post",
            get(|| async { "created" })
                .layer(RateLimitLayer::new(limiter, RoutePolicy::new("post:create", 2, WINDOW))),
        )
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/api/posts/create-post")
            .header("x-user-id", "U1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_contract_429_then_503() {
        let (store, _clock) = shared_store();
        let app = guarded_app(store.clone());

        for _ in 0..2 {
            assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::OK);
        }
        let rejected = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected.headers()["retry-after"], "60");

        store.set_available(false);
        let unavailable = app.oneshot(request()).await.unwrap();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(unavailable.headers().get("retry-after").is_none());
    }

    #[tokio::test]
    async fn test_counters_live_under_ratelimit_namespace() {
        let (store, _clock) = shared_store();
        let limiter = RateLimiter::new(store.clone());
        limiter
            .admit(&RateLimitKey::new("U1", "post:create"), 2, WINDOW)
            .await
            .unwrap();

        let keys = store.keys_with_prefix("ratelimit:").await.unwrap();
        assert_eq!(keys, vec!["ratelimit:post:create:U1".to_string()]);
    }
}
