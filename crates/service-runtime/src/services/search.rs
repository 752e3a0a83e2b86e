//! Search service read path. The index itself is maintained by
//! [`SearchIndexCoordinator`](sm_03_consistency::SearchIndexCoordinator).

use shared_types::cache_keys;
use sm_02_cache_manager::CacheManager;
use sm_03_consistency::{SearchIndex, SearchRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ServiceError;

/// Results returned per query.
pub const MAX_RESULTS: usize = 10;

pub struct SearchService {
    index: Arc<dyn SearchIndex>,
    cache: CacheManager,
    ttl: Duration,
}

impl SearchService {
    pub fn new(index: Arc<dyn SearchIndex>, cache: CacheManager, ttl: Duration) -> Self {
        Self { index, cache, ttl }
    }

    /// Best matches for `query`, read through `search:<query>`.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchRecord>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Validation("query must not be empty".into()));
        }

        let results = self
            .cache
            .get_or_load(&cache_keys::search(query), self.ttl, || async {
                self.index
                    .search(query, MAX_RESULTS)
                    .await
                    .map_err(ServiceError::from)
            })
            .await?;
        debug!(query, hits = results.len(), "Search served");
        Ok(results)
    }
}
