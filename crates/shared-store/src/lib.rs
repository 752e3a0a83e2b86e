//! # Shared Store
//!
//! Uniform client for the external key/value store every service shares.
//! The store plays two roles:
//!
//! - **Rate-limit counter storage**: [`SharedStore::consume_window`] performs
//!   the read-check-decrement of a fixed window in a single atomic step.
//! - **Read-through cache**: plain `GET` / `SET EX` / `DEL` plus prefix
//!   enumeration for bulk invalidation.
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`InMemoryStore`] | Tests and single-process deployments |
//! | `RedisStore` (feature `redis`) | Production, shared across processes |
//! | [`TimeoutStore`] | Decorator bounding every call of another backend |
//!
//! No call may block indefinitely: production wiring always wraps the
//! backend in a [`TimeoutStore`].

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod memory;
pub mod ports;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod timeout;

pub use memory::InMemoryStore;
pub use ports::{SharedStore, StoreError, WindowConsumption};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use timeout::TimeoutStore;

/// Default bound on a single store round-trip.
pub const DEFAULT_OP_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);
