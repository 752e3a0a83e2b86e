//! # Consistency Coordinator Subsystem
//!
//! **Subsystem ID:** 3
//!
//! ## Purpose
//!
//! Keeps state derived from posts (search index, media ownership, cached
//! views) eventually consistent with the post store by consuming the events
//! the post service publishes.
//!
//! ## Event Handling
//!
//! | Event | Consumer | Effect | Then invalidates |
//! |-------|----------|--------|------------------|
//! | `post.created` | search | upsert index record by `postId` | `search:`, `posts:` |
//! | `post.deleted` | search | tombstone, then remove index record (absent is fine) | `search:`, `posts:` |
//! | `post.deleted` | media | delete each owned object + metadata (absent is fine) | `media:`, `posts:` |
//!
//! The namespaces are configurable per coordinator through
//! `with_invalidated_prefixes`.
//!
//! ## Idempotency
//!
//! Delivery is at-least-once, so every effect is guarded by an
//! [`IdempotencyGuard`] marker keyed by the event's idempotency key. The
//! marker is written only after the effect and the cache invalidation both
//! succeeded; a crash in between simply repeats an effect that is itself
//! idempotent.
//!
//! The search consumer writes a per-post tombstone before removing a
//! record and checks it both before and after indexing, so a
//! `post.created` handled concurrently with (or after) the post's
//! `post.deleted` never leaves the record behind.
//!
//! ## Failure Mapping
//!
//! | Failure | Handler result | Bus behaviour |
//! |---------|----------------|---------------|
//! | undecodable payload | `Permanent` | dead-lettered at once |
//! | store / index / object storage unreachable | `Transient` | requeued, then dead-lettered |
//!
//! ## Module Structure
//!
//! ```text
//! coordinator/  - SearchIndexCoordinator, MediaCleanupCoordinator (EventHandler)
//! idempotency.rs - IdempotencyGuard over the shared store
//! ports/        - SearchIndex, MediaRepository, ObjectStorage
//! adapters/     - in-memory implementations of the ports
//! domain/       - SearchRecord, MediaRecord, CoordinatorError
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod coordinator;
pub mod domain;
pub mod idempotency;
pub mod ports;

pub use adapters::{InMemoryMediaRepository, InMemoryObjectStorage, InMemorySearchIndex};
pub use coordinator::{Effect, MediaCleanupCoordinator, SearchIndexCoordinator};
pub use domain::{CoordinatorError, MediaRecord, SearchRecord};
pub use idempotency::IdempotencyGuard;
pub use ports::{MediaRepository, ObjectStorage, SearchIndex};
