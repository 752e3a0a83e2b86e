//! In-memory adapters.
//!
//! Used by tests and by single-process deployments. Each adapter can be
//! switched "offline" to exercise the transient-failure path.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{MediaId, PostId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{CoordinatorError, MediaRecord, SearchRecord};
use crate::ports::{MediaRepository, ObjectStorage, SearchIndex};

/// Availability switch shared by the adapters below.
#[derive(Debug)]
struct Availability(AtomicBool);

impl Default for Availability {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl Availability {
    fn set(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }

    fn check(&self, err: impl FnOnce() -> CoordinatorError) -> Result<(), CoordinatorError> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(err())
        }
    }
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    records: RwLock<HashMap<PostId, SearchRecord>>,
    available: Availability,
}

impl InMemorySearchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn online(&self) -> Result<(), CoordinatorError> {
        self.available
            .check(|| CoordinatorError::Index("search index offline".into()))
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(&self, record: SearchRecord) -> Result<(), CoordinatorError> {
        self.online()?;
        self.records.write().insert(record.post_id.clone(), record);
        Ok(())
    }

    async fn remove(&self, post_id: &PostId) -> Result<bool, CoordinatorError> {
        self.online()?;
        Ok(self.records.write().remove(post_id).is_some())
    }

    async fn get(&self, post_id: &PostId) -> Result<Option<SearchRecord>, CoordinatorError> {
        self.online()?;
        Ok(self.records.read().get(post_id).cloned())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, CoordinatorError> {
        self.online()?;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read();
        let mut scored: Vec<(usize, &SearchRecord)> = records
            .values()
            .map(|r| (r.score(&terms), r))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Best score first, newest first among equals, id as a stable tiebreak
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.post_id.cmp(&b.post_id))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

// =============================================================================
// MEDIA METADATA
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryMediaRepository {
    records: RwLock<HashMap<MediaId, MediaRecord>>,
    available: Availability,
}

impl InMemoryMediaRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    fn online(&self) -> Result<(), CoordinatorError> {
        self.available
            .check(|| CoordinatorError::Storage("media repository offline".into()))
    }
}

#[async_trait]
impl MediaRepository for InMemoryMediaRepository {
    async fn insert(&self, record: MediaRecord) -> Result<(), CoordinatorError> {
        self.online()?;
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &MediaId) -> Result<Option<MediaRecord>, CoordinatorError> {
        self.online()?;
        Ok(self.records.read().get(id).cloned())
    }

    async fn delete(&self, id: &MediaId) -> Result<bool, CoordinatorError> {
        self.online()?;
        Ok(self.records.write().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<MediaRecord>, CoordinatorError> {
        self.online()?;
        let mut all: Vec<MediaRecord> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashSet<String>>,
    available: Availability,
}

impl InMemoryObjectStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Record an uploaded object.
    pub fn put(&self, public_id: impl Into<String>) {
        self.objects.write().insert(public_id.into());
    }

    #[must_use]
    pub fn contains(&self, public_id: &str) -> bool {
        self.objects.read().contains(public_id)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn delete(&self, public_id: &str) -> Result<bool, CoordinatorError> {
        self.available
            .check(|| CoordinatorError::Storage("object storage offline".into()))?;
        Ok(self.objects.write().remove(public_id))
    }
}
