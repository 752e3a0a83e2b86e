//! # Event Publisher
//!
//! The publishing side of the bus. Services publish a [`DomainEvent`] after
//! their system-of-record write; the event goes out on the topic named by
//! its type.

use async_trait::async_trait;
use mesh_telemetry::BUS_MESSAGES_PUBLISHED;
use shared_types::DomainEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::error::BusError;
use crate::DEFAULT_OP_TIMEOUT;

/// Port services use to emit domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` on its topic.
    ///
    /// Success means the broker accepted the message; delivery to every
    /// durable queue bound to the topic is then at-least-once.
    async fn publish(&self, event: &DomainEvent) -> Result<Uuid, BusError>;

    /// Total events accepted by the broker through this publisher.
    fn events_published(&self) -> u64;
}

/// [`EventPublisher`] over any [`Broker`], with a bounded round-trip.
pub struct BusPublisher {
    broker: Arc<dyn Broker>,
    timeout: Duration,
    events_published: AtomicU64,
}

impl BusPublisher {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_timeout(broker, DEFAULT_OP_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self {
            broker,
            timeout,
            events_published: AtomicU64::new(0),
        }
    }

    /// Publish raw bytes on `topic`.
    pub async fn publish_raw(&self, topic: &str, body: Vec<u8>) -> Result<Uuid, BusError> {
        let id = tokio::time::timeout(self.timeout, self.broker.publish(topic, body))
            .await
            .map_err(|_| BusError::Timeout {
                operation: "publish",
                timeout: self.timeout,
            })
            .and_then(|r| r)
            .inspect_err(|e| warn!(topic, error = %e, "Publish failed"))?;

        self.events_published.fetch_add(1, Ordering::Relaxed);
        BUS_MESSAGES_PUBLISHED.with_label_values(&[topic]).inc();
        Ok(id)
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<Uuid, BusError> {
        let body = event.to_bytes()?;
        let id = self.publish_raw(event.topic(), body).await?;
        debug!(
            topic = event.topic(),
            idempotency_key = %event.idempotency_key,
            message_id = %id,
            "Event published"
        );
        Ok(id)
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
