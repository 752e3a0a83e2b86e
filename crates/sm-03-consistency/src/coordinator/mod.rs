//! Event handlers applying consistency effects.

pub mod media;
pub mod search;

pub use media::MediaCleanupCoordinator;
pub use search::SearchIndexCoordinator;

use sm_02_cache_manager::CacheManager;
use tracing::debug;

use crate::domain::CoordinatorError;

/// What a coordinator did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The effect was applied and recorded.
    Applied,
    /// The event was already processed; nothing was done.
    Duplicate,
    /// A later event superseded this one (e.g. created after deleted).
    Superseded,
}

/// Invalidate every namespace that may hold views of the changed entity.
pub(crate) async fn invalidate_all(
    cache: &CacheManager,
    prefixes: &[String],
) -> Result<(), CoordinatorError> {
    for prefix in prefixes {
        let removed = cache.invalidate_prefix(prefix).await?;
        debug!(prefix = %prefix, removed, "Derived views invalidated");
    }
    Ok(())
}
