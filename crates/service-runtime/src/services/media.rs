//! Media service metadata.
//!
//! Receiving the file and storing it in object storage happen upstream; this
//! service records who owns the stored object so the media consumer can
//! clean it up when the post goes away.

use chrono::Utc;
use serde::Deserialize;
use shared_types::{cache_keys, MediaId, UserId};
use sm_02_cache_manager::CacheManager;
use sm_03_consistency::{MediaRecord, MediaRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::ServiceError;

/// An object already stored upstream, to be registered.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    pub public_id: String,
    pub url: String,
    pub original_name: String,
    pub mime_type: String,
}

pub struct MediaService {
    media: Arc<dyn MediaRepository>,
    cache: CacheManager,
    list_ttl: Duration,
}

impl MediaService {
    pub fn new(media: Arc<dyn MediaRepository>, cache: CacheManager, list_ttl: Duration) -> Self {
        Self {
            media,
            cache,
            list_ttl,
        }
    }

    pub async fn register_media(
        &self,
        owner: UserId,
        input: NewMedia,
    ) -> Result<MediaRecord, ServiceError> {
        if input.public_id.trim().is_empty() {
            return Err(ServiceError::Validation("publicId must not be empty".into()));
        }

        let record = MediaRecord {
            id: MediaId::generate(),
            user_id: owner,
            public_id: input.public_id,
            url: input.url,
            original_name: input.original_name,
            mime_type: input.mime_type,
            created_at: Utc::now(),
        };
        self.media.insert(record.clone()).await?;
        self.cache.invalidate(&cache_keys::media_list()).await?;

        info!(
            media_id = %record.id,
            user_id = %record.user_id,
            mime_type = %record.mime_type,
            "Media registered"
        );
        Ok(record)
    }

    /// All media, newest first, read through `media:all`.
    pub async fn list_media(&self) -> Result<Vec<MediaRecord>, ServiceError> {
        self.cache
            .get_or_load(&cache_keys::media_list(), self.list_ttl, || async {
                self.media.list().await.map_err(ServiceError::from)
            })
            .await
    }
}
