//! # Cache Manager Subsystem
//!
//! **Subsystem ID:** 2
//!
//! Read-through caching of query results in the shared store.
//!
//! ## Usage Pattern
//!
//! ```text
//! get(key) ── hit ──▶ return
//!    │
//!   miss ──▶ load from system-of-record ──▶ set(key, value, ttl) ──▶ return
//! ```
//!
//! ## Invalidation
//!
//! Writers call [`CacheManager::invalidate_prefix`] before acknowledging a
//! write. The prefix is enumerated and its keys deleted; this is not atomic
//! across the set, so a concurrent reader may observe a partially
//! invalidated namespace. Every entry also carries a TTL, which bounds how
//! long such staleness can last.
//!
//! ## Failure Policy
//!
//! | Operation | Store failure |
//! |-----------|---------------|
//! | `get`, `set`, `invalidate*` | returned as [`CacheError`] |
//! | `get_or_load` read | treated as a miss |
//! | `get_or_load` write | logged, value still returned |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod service;

pub use error::CacheError;
pub use service::CacheManager;
