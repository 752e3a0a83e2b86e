//! # Broker Port and In-Memory Broker
//!
//! [`Broker`] is the outbound port the publisher and the consumer tasks
//! talk to. [`InMemoryBroker`] implements it for single-process
//! deployments and tests.
//!
//! ## Topology
//!
//! - A topic keeps a bounded log of recent messages. A queue declared after
//!   publication is seeded from that log, so late subscribers still see
//!   every retained event.
//! - Each queue bound to a topic receives its own copy of every message.
//! - [`Broker::next_delivery`] hands each message to exactly one waiting
//!   consumer of the queue.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::BusError;
use crate::message::{DeadLetter, Message};
use crate::DEFAULT_RETENTION;

/// Outbound port to a message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a message to `topic`, copying it to every bound queue.
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<Uuid, BusError>;

    /// Create `queue` (if absent) and bind it to `topic`.
    ///
    /// Declaring an existing binding again is a no-op, which is how a second
    /// instance of a service joins the same queue as a competing consumer.
    async fn declare_queue(&self, topic: &str, queue: &str) -> Result<(), BusError>;

    /// Wait for the next ready message on `queue`.
    ///
    /// Returns [`BusError::Closed`] once the broker shuts down.
    async fn next_delivery(&self, queue: &str) -> Result<Delivery, BusError>;

    /// Messages dead-lettered from `queue`, oldest first.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, BusError>;
}

/// Settles deliveries on behalf of a broker.
pub trait Acknowledger: Send + Sync {
    /// The message was processed; forget it.
    fn ack(&self, queue: &str, message: &Message, attempt: u32);

    /// Make the message visible again after `delay` as attempt `attempt + 1`.
    fn requeue(&self, queue: &str, message: Message, attempt: u32, delay: Duration);

    /// Park the message on the queue's dead-letter destination.
    fn dead_letter(&self, queue: &str, message: Message, attempt: u32, reason: String);
}

/// A message handed to one consumer.
///
/// Settle it with [`ack`](Self::ack), [`requeue`](Self::requeue) or
/// [`dead_letter`](Self::dead_letter). Dropping it unsettled requeues it.
pub struct Delivery {
    queue: String,
    attempt: u32,
    message: Message,
    acknowledger: Arc<dyn Acknowledger>,
    settled: bool,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        message: Message,
        attempt: u32,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            queue: queue.into(),
            attempt,
            message,
            acknowledger,
            settled: false,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// 1 for the first delivery, incremented on every redelivery.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn ack(mut self) {
        self.settled = true;
        self.acknowledger
            .ack(&self.queue, &self.message, self.attempt);
    }

    pub fn requeue(mut self, delay: Duration) {
        self.settled = true;
        let message = std::mem::take(&mut self.message);
        self.acknowledger
            .requeue(&self.queue, message, self.attempt, delay);
    }

    pub fn dead_letter(mut self, reason: impl Into<String>) {
        self.settled = true;
        let message = std::mem::take(&mut self.message);
        self.acknowledger
            .dead_letter(&self.queue, message, self.attempt, reason.into());
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("attempt", &self.attempt)
            .field("message_id", &self.message.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(
            queue = %self.queue,
            message_id = %self.message.id,
            attempt = self.attempt,
            "Unsettled delivery dropped, requeueing"
        );
        let message = std::mem::take(&mut self.message);
        self.acknowledger
            .requeue(&self.queue, message, self.attempt, Duration::ZERO);
    }
}

// =============================================================================
// IN-MEMORY BROKER
// =============================================================================

struct Pending {
    message: Message,
    attempt: u32,
    not_before: Instant,
}

#[derive(Default)]
struct QueueState {
    ready: Mutex<VecDeque<Pending>>,
    dead: Mutex<Vec<DeadLetter>>,
    notify: Notify,
}

impl QueueState {
    fn push(&self, message: Message, attempt: u32, not_before: Instant) {
        self.ready.lock().push_back(Pending {
            message,
            attempt,
            not_before,
        });
        self.notify.notify_one();
    }

    /// Remove the oldest message visible at `now`.
    ///
    /// Otherwise returns the instant the next delayed message becomes
    /// visible, if any.
    fn take_ready(&self, now: Instant) -> Result<Pending, Option<Instant>> {
        let mut ready = self.ready.lock();
        match ready.iter().position(|p| p.not_before <= now) {
            Some(index) => ready.remove(index).ok_or(None),
            None => Err(ready.iter().map(|p| p.not_before).min()),
        }
    }

    fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }
}

impl Acknowledger for QueueState {
    fn ack(&self, queue: &str, message: &Message, attempt: u32) {
        debug!(queue, message_id = %message.id, attempt, "Delivery acknowledged");
    }

    fn requeue(&self, _queue: &str, message: Message, attempt: u32, delay: Duration) {
        self.push(message, attempt.saturating_add(1), Instant::now() + delay);
    }

    fn dead_letter(&self, queue: &str, message: Message, attempt: u32, reason: String) {
        self.dead.lock().push(DeadLetter {
            message,
            queue: queue.to_string(),
            attempts: attempt,
            reason,
            dead_lettered_at: Utc::now(),
        });
    }
}

#[derive(Default)]
struct TopicState {
    bindings: Vec<(String, Arc<QueueState>)>,
    retained: VecDeque<Message>,
}

struct Inner {
    topics: Mutex<HashMap<String, TopicState>>,
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    retention: usize,
    available: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
}

/// Process-local [`Broker`].
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Broker retaining at most `retention` messages per topic.
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                retention,
                available: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Simulate the broker becoming unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Shut the broker down, waking every waiting consumer.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.shutdown.notify_waiters();
        info!("In-memory broker closed");
    }

    /// Messages waiting (ready or delayed) on `queue`.
    #[must_use]
    pub fn pending(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map_or(0, |q| q.ready_len())
    }

    /// Messages dead-lettered from `queue` so far.
    #[must_use]
    pub fn dead_letter_count(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map_or(0, |q| q.dead.lock().len())
    }

    fn check_open(&self) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("broker unreachable".to_string()));
        }
        Ok(())
    }

    fn queue(&self, queue: &str) -> Result<Arc<QueueState>, BusError> {
        self.inner
            .queues
            .lock()
            .get(queue)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("retention", &self.inner.retention)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<Uuid, BusError> {
        self.check_open()?;
        let message = Message::new(topic, body);
        let id = message.id;
        let now = Instant::now();

        let mut topics = self.inner.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        if self.inner.retention > 0 {
            state.retained.push_back(message.clone());
            while state.retained.len() > self.inner.retention {
                state.retained.pop_front();
            }
        }
        for (_, queue) in &state.bindings {
            queue.push(message.clone(), 1, now);
        }

        debug!(topic, message_id = %id, queues = state.bindings.len(), "Message published");
        Ok(id)
    }

    async fn declare_queue(&self, topic: &str, queue: &str) -> Result<(), BusError> {
        self.check_open()?;
        let mut topics = self.inner.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        if state.bindings.iter().any(|(name, _)| name == queue) {
            debug!(topic, queue, "Queue already bound, joining as competing consumer");
            return Ok(());
        }

        let queue_state = self
            .inner
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .clone();
        let now = Instant::now();
        for message in &state.retained {
            queue_state.push(message.clone(), 1, now);
        }
        info!(
            topic,
            queue,
            replayed = state.retained.len(),
            "Durable queue bound"
        );
        state.bindings.push((queue.to_string(), queue_state));
        Ok(())
    }

    async fn next_delivery(&self, queue: &str) -> Result<Delivery, BusError> {
        let state = self.queue(queue)?;
        loop {
            // Register interest before checking state so a concurrent push or
            // close cannot slip between the check and the wait.
            let pushed = state.notify.notified();
            let shutdown = self.inner.shutdown.notified();

            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(BusError::Closed);
            }

            let wake_at = match state.take_ready(Instant::now()) {
                Ok(pending) => {
                    let acknowledger: Arc<dyn Acknowledger> = state.clone();
                    return Ok(Delivery::new(
                        queue,
                        pending.message,
                        pending.attempt,
                        acknowledger,
                    ));
                }
                Err(wake_at) => wake_at,
            };

            let delayed = async move {
                match wake_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = pushed => {}
                () = shutdown => {}
                () = delayed => {}
            }
        }
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, BusError> {
        Ok(self.queue(queue)?.dead.lock().clone())
    }
}
