//! # Rate Limiter Subsystem
//!
//! **Subsystem ID:** 1
//!
//! ## Purpose
//!
//! Decides admit/reject for a `(subject, action scope)` pair using fixed-window
//! counters held in the shared store, so every process of every service sees
//! the same budget.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | `capacity` admits per window, the next one rejected | `SharedStore::consume_window` |
//! | Read-check-decrement is atomic across processes | store primitive (mutex / Lua script) |
//! | Exhausted key admits again once the window closes | window deadline in the store |
//! | `retry_after > 0` on every rejection | `service.rs` |
//! | Store failure is an error, never a rejection | `RateLimitError::Infrastructure` |
//!
//! ## HTTP Contract
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | Allowed | handler's | handler's |
//! | Rejected | 429 + `Retry-After` | `{"success":false,"message":"Too many requests","retryAfter":n}` |
//! | Store failure | 503 | `{"success":false,"message":"Service temporarily unavailable"}` |
//!
//! ## Module Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  middleware.rs  - RateLimitLayer (tower), KeyExtractor      │
//! └─────────────────────────────────────────────────────────────┘
//!                          ↓ uses ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs - RateLimiterApi                          │
//! │  service.rs       - RateLimiter over Arc<dyn SharedStore>   │
//! └─────────────────────────────────────────────────────────────┘
//!                          ↓ uses ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  domain/ - RateLimitKey, Decision, RoutePolicy, errors      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod middleware;
pub mod ports;
pub mod service;

pub use domain::{Decision, RateLimitError, RateLimitKey, RoutePolicy};
pub use middleware::{KeyExtractor, RateLimitLayer, RateLimitService};
pub use ports::RateLimiterApi;
pub use service::RateLimiter;
