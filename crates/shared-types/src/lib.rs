//! # Shared Types Crate
//!
//! Types that cross service boundaries in the social-mesh system.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: event payloads and cache key namespaces are
//!   defined once here so producers and consumers cannot drift apart.
//! - **Stable Wire Names**: every payload serializes with the camelCase field
//!   names the services have always exchanged (`postId`, `mediaIds`, ...).
//! - **Deterministic Identity**: every [`DomainEvent`] carries an idempotency
//!   key derived from the event type and the entity it describes, so a
//!   redelivered event is recognisable by any consumer.

pub mod bucket;
pub mod cache_keys;
pub mod clock;
pub mod entities;
pub mod events;

pub use bucket::Bucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{MediaId, Post, PostId, UserId};
pub use events::{
    idempotency_key, DomainEvent, EventError, EventPayload, EventType, PostCreated, PostDeleted,
};
