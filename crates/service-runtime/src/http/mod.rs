//! # HTTP Surface
//!
//! | Route | Method | Policy |
//! |-------|--------|--------|
//! | `/api/posts/create-post` | POST | `post:create` |
//! | `/api/posts/all-posts` | GET | `post:getall` |
//! | `/api/posts/:id` | GET | `post:get` |
//! | `/api/posts/:id` | DELETE | `post:delete` |
//! | `/api/search/posts?query=` | GET | `search:query` |
//! | `/api/media` | GET | none |
//! | `/api/media/upload` | POST | `media:upload` |
//! | `/metrics`, `/health` | GET | none |
//!
//! Every `/api` route additionally sits behind the per-IP `gateway` budget.
//! Each limiter layer is built once here; requests only carry the key.

pub mod auth;
pub mod handlers;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use sm_01_rate_limiter::{KeyExtractor, RateLimitLayer, RateLimiterApi, RoutePolicy};
use std::sync::Arc;

use crate::config::{RateLimitConfig, ServiceRole};
use crate::services::{MediaService, PostService, SearchService};

pub use auth::CurrentUser;

/// Services whose routes are mounted. Absent services are not hosted by
/// this process.
#[derive(Clone, Default)]
pub struct ApiServices {
    pub posts: Option<Arc<PostService>>,
    pub search: Option<Arc<SearchService>>,
    pub media: Option<Arc<MediaService>>,
}

/// Build the full router for `role`.
pub fn build_router(
    role: ServiceRole,
    services: &ApiServices,
    limiter: Arc<dyn RateLimiterApi>,
    limits: &RateLimitConfig,
) -> Router {
    let limit = |policy: &RoutePolicy| RateLimitLayer::new(Arc::clone(&limiter), policy.clone());

    let mut api = Router::new();

    if let Some(posts) = &services.posts {
        api = api.merge(
            Router::new()
                .route(
                    "/api/posts/create-post",
                    post(handlers::create_post).layer(limit(&limits.post_create)),
                )
                .route(
                    "/api/posts/all-posts",
                    get(handlers::list_posts).layer(limit(&limits.post_get_all)),
                )
                .route(
                    "/api/posts/:id",
                    get(handlers::get_post)
                        .layer(limit(&limits.post_get))
                        .merge(delete(handlers::delete_post).layer(limit(&limits.post_delete))),
                )
                .with_state(Arc::clone(posts)),
        );
    }

    if let Some(search) = &services.search {
        api = api.merge(
            Router::new()
                .route(
                    "/api/search/posts",
                    get(handlers::search_posts).layer(limit(&limits.search_query)),
                )
                .with_state(Arc::clone(search)),
        );
    }

    if let Some(media) = &services.media {
        api = api.merge(
            Router::new()
                .route("/api/media", get(handlers::list_media))
                .route(
                    "/api/media/upload",
                    post(handlers::register_media).layer(limit(&limits.media_upload)),
                )
                .with_state(Arc::clone(media)),
        );
    }

    let gateway = limit(&limits.gateway).with_extractor(KeyExtractor::Ip);

    Router::new()
        .merge(api.layer(gateway))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/health",
            get(move || async move {
                Json(json!({
                    "status": "healthy",
                    "service": role.as_str(),
                    "version": env!("CARGO_PKG_VERSION"),
                }))
            }),
        )
}
