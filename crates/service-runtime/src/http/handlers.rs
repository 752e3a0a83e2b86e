//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use shared_types::PostId;
use std::sync::Arc;
use tracing::{error, info};

use super::auth::CurrentUser;
use crate::error::ServiceError;
use crate::services::{MediaService, NewMedia, NewPost, PostService, SearchService};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

// =============================================================================
// POSTS
// =============================================================================

pub async fn create_post(
    State(posts): State<Arc<PostService>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<NewPost>,
) -> Result<impl IntoResponse, ServiceError> {
    info!(user_id = %user, "Create post endpoint hit");
    let post = posts.create_post(user, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Post created successfully",
            "post": post,
        })),
    ))
}

pub async fn list_posts(
    State(posts): State<Arc<PostService>>,
    _user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = posts
        .list_posts(
            query.page.unwrap_or(DEFAULT_PAGE),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(page))
}

pub async fn get_post(
    State(posts): State<Arc<PostService>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(posts.get_post(&PostId::new(id)).await?))
}

pub async fn delete_post(
    State(posts): State<Arc<PostService>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    posts.delete_post(&user, &PostId::new(id)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Post deleted successfully",
    })))
}

// =============================================================================
// SEARCH
// =============================================================================

pub async fn search_posts(
    State(search): State<Arc<SearchService>>,
    _user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let query = query.query.unwrap_or_default();
    Ok(Json(search.search(&query).await?))
}

// =============================================================================
// MEDIA
// =============================================================================

pub async fn list_media(
    State(media): State<Arc<MediaService>>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let result = media.list_media().await?;
    Ok(Json(json!({ "result": result })))
}

pub async fn register_media(
    State(media): State<Arc<MediaService>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<NewMedia>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = media.register_media(user, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "mediaId": record.id,
            "url": record.url,
            "message": "Media upload is successful",
        })),
    ))
}

// =============================================================================
// OPERATIONS
// =============================================================================

pub async fn metrics() -> Response {
    match mesh_telemetry::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
