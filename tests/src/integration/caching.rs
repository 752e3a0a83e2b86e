//! # Cached Views Under Writes
//!
//! Reads through the HTTP surface populate the shared cache; writes must
//! have invalidated the affected views by the time they answer.

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use service_runtime::{MeshConfig, Repositories, ServiceRole, ServiceRuntime};
    use shared_bus::InMemoryBroker;
    use shared_store::{InMemoryStore, SharedStore};
    use shared_types::cache_keys;
    use shared_types::PostId;
    use sm_02_cache_manager::CacheManager;
    use sm_03_consistency::SearchIndex;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::integration::eventually_async;

    async fn runtime() -> (ServiceRuntime, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let runtime = ServiceRuntime::with_backends(
            MeshConfig {
                service: ServiceRole::All,
                ..MeshConfig::default()
            },
            store.clone(),
            Arc::new(InMemoryBroker::new()),
            Repositories::in_memory(),
        )
        .await
        .unwrap();
        runtime.start().await.unwrap();
        (runtime, store)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-id", "u1")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap()
    }

    fn send(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "u1")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create(app: &Router, content: &str) -> PostId {
        let (status, body) = call(
            app,
            send(
                Method::POST,
                "/api/posts/create-post",
                &format!(r#"{{"content":"{content}"}}"#),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        PostId::new(body["post"]["id"].as_str().unwrap())
    }

    #[tokio::test]
    async fn test_create_answers_only_after_list_views_are_gone() {
        let (runtime, store) = runtime().await;
        let app = runtime.router();
        create(&app, "first").await;

        let (status, page) = call(&app, get("/api/posts/all-posts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["totalPosts"], 1);
        assert!(store.get(&cache_keys::post_list(1, 10)).await.unwrap().is_some());

        create(&app, "second").await;
        assert!(store.get(&cache_keys::post_list(1, 10)).await.unwrap().is_none());

        let (_, page) = call(&app, get("/api/posts/all-posts")).await;
        assert_eq!(page["totalPosts"], 2);
        assert_eq!(page["posts"][0]["content"], "second");
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_drops_single_post_view() {
        let (runtime, store) = runtime().await;
        let app = runtime.router();
        let id = create(&app, "ephemeral").await;

        let (status, _) = call(&app, get(&format!("/api/posts/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(store.get(&cache_keys::single_post(&id)).await.unwrap().is_some());

        let (status, body) = call(&app, send(Method::DELETE, &format!("/api/posts/{id}"), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Post deleted successfully");
        assert!(store.get(&cache_keys::single_post(&id)).await.unwrap().is_none());

        let (status, _) = call(&app, get(&format!("/api/posts/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_search_views_expire_through_the_consumer() {
        let (runtime, store) = runtime().await;
        let app = runtime.router();
        let first = create(&app, "rust one").await;

        let index = Arc::clone(&runtime.repositories().search_index);
        eventually_async(|| {
            let index = Arc::clone(&index);
            let first = first.clone();
            async move { index.get(&first).await.unwrap().is_some() }
        })
        .await;

        let (status, hits) = call(&app, get("/api/search/posts?query=rust")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hits.as_array().map(Vec::len), Some(1));
        assert!(store.get(&cache_keys::search("rust")).await.unwrap().is_some());

        // The cached one-hit answer stands until the consumer indexes the
        // second post and drops every search view.
        create(&app, "rust two").await;
        let search = runtime.services().search.clone().unwrap();
        eventually_async(|| {
            let search = Arc::clone(&search);
            async move { search.search("rust").await.unwrap().len() == 2 }
        })
        .await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_prefix_invalidation_spares_other_namespaces() {
        let store = Arc::new(InMemoryStore::new());
        let cache = CacheManager::new(store.clone());
        let ttl = Duration::from_secs(300);

        for key in ["posts:1:10", "posts:2:10", "posts:p1"] {
            cache.set(key, &"view", ttl).await.unwrap();
        }
        cache.set("search:rust", &"hits", ttl).await.unwrap();

        assert_eq!(cache.invalidate_prefix("posts:").await.unwrap(), 3);
        for key in ["posts:1:10", "posts:2:10", "posts:p1"] {
            assert!(cache.get::<String>(key).await.unwrap().is_none());
        }
        assert_eq!(
            cache.get::<String>("search:rust").await.unwrap().as_deref(),
            Some("hits")
        );
    }
}
