//! # Shared Bus - Event Bus Client
//!
//! Durable, at-least-once event delivery between social-mesh services.
//!
//! ## Delivery Model
//!
//! ```text
//!                      ┌───────────────────────────────┐
//!  post-service        │ topic "post.deleted"          │
//!  publish() ────────▶ │   retained log (replay)       │
//!                      └──────┬─────────────────┬──────┘
//!                             │ copy            │ copy          (fan-out)
//!                             ▼                 ▼
//!            queue "search-service.post.deleted"   queue "media-service.post.deleted"
//!                 │               │                        │
//!            consumer A      consumer B               consumer C
//!            (competing on one queue)
//! ```
//!
//! - Every queue bound to a topic receives its own copy of each message.
//! - Consumers sharing a queue name compete; each message goes to one of them.
//! - A delivery is settled exactly once: ack, requeue (bounded), or
//!   dead-letter. An unsettled delivery that is dropped goes back on its
//!   queue, which models a consumer crashing before it acknowledged.
//! - After `max_attempts` failed deliveries a message is moved to the
//!   queue's dead-letter destination and never retried automatically.
//!
//! Handlers must therefore be idempotent.
//!
//! ## Backends
//!
//! | Broker | Feature | Use |
//! |--------|---------|-----|
//! | [`InMemoryBroker`] | always | single process, tests |
//! | `KafkaBroker` | `kafka` | services split across processes |

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod message;
pub mod publisher;
pub mod subscriber;

pub use broker::{Acknowledger, Broker, Delivery, InMemoryBroker};
pub use error::BusError;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use message::{DeadLetter, Message};
pub use publisher::{BusPublisher, EventPublisher};
pub use subscriber::{EventHandler, HandlerError, Subscriber, Subscription, SubscriptionConfig};

use std::time::Duration;

/// Messages retained per topic for queues declared after publication.
pub const DEFAULT_RETENTION: usize = 10_000;

/// Deliveries attempted before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Bound on every broker round-trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Base delay before a failed delivery becomes visible again.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Durable queue name for `service` consuming `topic`.
///
/// Every instance of one service uses the same name, so instances compete
/// while distinct services each get a copy.
#[must_use]
pub fn queue_name(service: &str, topic: &str) -> String {
    format!("{service}.{topic}")
}
