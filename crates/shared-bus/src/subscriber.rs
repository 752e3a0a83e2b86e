//! # Event Subscriber
//!
//! One long-lived consumer task per subscription. The task pulls a delivery,
//! runs the handler, and settles the delivery according to the result:
//!
//! | Handler result | Attempt < max | Attempt = max |
//! |----------------|---------------|---------------|
//! | `Ok(())` | ack | ack |
//! | `Transient` | requeue with backoff | dead-letter |
//! | `Permanent` | dead-letter | dead-letter |
//! | undecodable body | dead-letter | dead-letter |
//!
//! Deliveries on one queue are processed one at a time per task, so a
//! handler never runs concurrently with itself inside one process.

use async_trait::async_trait;
use mesh_telemetry::{BUS_DELIVERIES, DEAD_LETTERS};
use shared_types::DomainEvent;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Delivery};
use crate::error::BusError;
use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_OP_TIMEOUT, DEFAULT_RETRY_BACKOFF};

/// Failure reported by an [`EventHandler`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A dependency was unreachable; the event should be retried.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The event can never be processed; retrying is pointless.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// Consumer-side callback for one subscription.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: DomainEvent) -> Result<(), HandlerError>;
}

/// Retry policy and timeouts for a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Deliveries attempted before dead-lettering.
    pub max_attempts: u32,
    /// Base redelivery delay, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Bound on broker round-trips made while subscribing.
    pub op_timeout: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Binds durable queues and spawns their consumer tasks.
pub struct Subscriber {
    broker: Arc<dyn Broker>,
    config: SubscriptionConfig,
}

impl Subscriber {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, config: SubscriptionConfig) -> Self {
        Self { broker, config }
    }

    /// Bind `queue` to `topic` and start consuming it with `handler`.
    ///
    /// # Errors
    ///
    /// Fails if the queue cannot be declared. Callers treat this as fatal at
    /// startup: a service must not run without its consumers attached.
    pub async fn subscribe(
        &self,
        topic: &str,
        queue: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError> {
        tokio::time::timeout(self.config.op_timeout, self.broker.declare_queue(topic, queue))
            .await
            .map_err(|_| BusError::Timeout {
                operation: "declare_queue",
                timeout: self.config.op_timeout,
            })??;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = Consumer {
            broker: Arc::clone(&self.broker),
            queue: queue.to_string(),
            handler,
            config: self.config.clone(),
        };
        let task = tokio::spawn(consumer.run(shutdown_rx));

        info!(topic, queue, "Subscription started");
        Ok(Subscription {
            topic: topic.to_string(),
            queue: queue.to_string(),
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a running consumer task.
pub struct Subscription {
    topic: String,
    queue: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop consuming after the in-flight delivery settles.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(queue = %self.queue, error = %e, "Consumer task ended abnormally");
        }
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Acked,
    Requeued,
    DeadLettered,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::Requeued => "requeued",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

struct Consumer {
    broker: Arc<dyn Broker>,
    queue: String,
    handler: Arc<dyn EventHandler>,
    config: SubscriptionConfig,
}

impl Consumer {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let delivery = tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!(queue = %self.queue, "Consumer shutting down");
                    break;
                }
                next = self.broker.next_delivery(&self.queue) => match next {
                    Ok(delivery) => delivery,
                    Err(BusError::Closed) => {
                        info!(queue = %self.queue, "Broker closed, consumer stopping");
                        break;
                    }
                    Err(e) => {
                        warn!(queue = %self.queue, error = %e, "Failed to fetch delivery");
                        tokio::time::sleep(self.config.retry_backoff).await;
                        continue;
                    }
                },
            };

            let outcome = self.process(delivery).await;
            BUS_DELIVERIES
                .with_label_values(&[self.queue.as_str(), outcome.as_str()])
                .inc();
        }
    }

    async fn process(&self, delivery: Delivery) -> Outcome {
        let attempt = delivery.attempt();
        let message_id = delivery.message().id;

        let event = match DomainEvent::from_bytes(&delivery.message().body) {
            Ok(event) if event.topic() == delivery.message().topic => event,
            Ok(event) => {
                let reason = format!(
                    "event type {} does not belong on topic {}",
                    event.event_type,
                    delivery.message().topic
                );
                return self.dead_letter(delivery, reason);
            }
            Err(e) => return self.dead_letter(delivery, e.to_string()),
        };

        let key = event.idempotency_key.clone();
        match self.handler.handle(event).await {
            Ok(()) => {
                debug!(queue = %self.queue, %message_id, idempotency_key = %key, "Event handled");
                delivery.ack();
                Outcome::Acked
            }
            Err(HandlerError::Transient(reason)) if attempt < self.config.max_attempts => {
                let delay = self.config.retry_backoff.saturating_mul(attempt);
                warn!(
                    queue = %self.queue,
                    %message_id,
                    idempotency_key = %key,
                    attempt,
                    max_attempts = self.config.max_attempts,
                    ?delay,
                    %reason,
                    "Handler failed, requeueing"
                );
                delivery.requeue(delay);
                Outcome::Requeued
            }
            Err(e) => self.dead_letter(delivery, e.to_string()),
        }
    }

    fn dead_letter(&self, delivery: Delivery, reason: String) -> Outcome {
        error!(
            queue = %self.queue,
            message_id = %delivery.message().id,
            attempts = delivery.attempt(),
            %reason,
            "Permanent delivery failure, dead-lettering"
        );
        DEAD_LETTERS.with_label_values(&[self.queue.as_str()]).inc();
        delivery.dead_letter(reason);
        Outcome::DeadLettered
    }
}
