//! # In-Memory Store
//!
//! Process-local implementation of [`SharedStore`]. A single mutex guards
//! the whole keyspace, which makes every operation (including
//! `consume_window`) atomic with respect to concurrent callers in this
//! process. Expiry is lazy: an entry past its deadline is treated as absent
//! and reaped on the next touch.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Bucket, Clock, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::ports::{SharedStore, StoreError, WindowConsumption};

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Window(Bucket),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// In-memory [`SharedStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create a store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(match &entry.slot {
                Slot::Text(value) => value.clone(),
                Slot::Window(bucket) => bucket.used().to_string(),
            })),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_available()?;
        let expires_at = self.clock.now() + ttl;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.is_live(now));
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn consume_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowConsumption, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let mut bucket = match entries.get(key) {
            Some(Entry {
                slot: Slot::Window(bucket),
                ..
            }) if bucket.is_current(now) => *bucket,
            _ => {
                trace!(key, capacity, window_ms = window.as_millis() as u64, "Starting new window");
                Bucket::start(capacity, window, now)
            }
        };

        let admitted = bucket.try_consume();
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Window(bucket),
                expires_at: Some(bucket.deadline()),
            },
        );
        Ok(WindowConsumption {
            admitted,
            remaining: bucket.remaining,
            resets_in: bucket.resets_in(now),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}
