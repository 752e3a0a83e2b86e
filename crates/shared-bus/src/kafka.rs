//! # Kafka Broker
//!
//! Production [`Broker`] backed by Kafka, shared by every process.
//!
//! | Bus concept | Kafka |
//! |-------------|-------|
//! | topic | topic, keyed by message id |
//! | queue | consumer group named after the queue |
//! | competing consumers | members of one group splitting partitions |
//! | late subscriber replay | `auto.offset.reset = earliest` |
//! | requeue | copy to `<queue>.retry` carrying attempt and not-before headers |
//! | dead letter | copy to `<queue>.dead-letter` carrying the reason |
//!
//! Offsets are committed by hand, only once a delivery is settled. A retry
//! or dead-letter copy commits the original offset after Kafka accepted the
//! copy, so a consumer that crashes mid-handler sees the message again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers, Message as _, OwnedHeaders, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Acknowledger, Broker, Delivery};
use crate::error::BusError;
use crate::message::{DeadLetter, Message};

const ATTEMPT_HEADER: &str = "mesh-attempt";
const ORIGIN_TOPIC_HEADER: &str = "mesh-origin-topic";
const NOT_BEFORE_HEADER: &str = "mesh-not-before-ms";
const REASON_HEADER: &str = "mesh-dead-letter-reason";

/// Topic holding delayed redeliveries for `queue`.
#[must_use]
pub fn retry_topic(queue: &str) -> String {
    format!("{queue}.retry")
}

/// Topic holding messages parked from `queue`.
#[must_use]
pub fn dead_letter_topic(queue: &str) -> String {
    format!("{queue}.dead-letter")
}

/// Kafka-backed [`Broker`].
#[derive(Clone)]
pub struct KafkaBroker {
    inner: Arc<Inner>,
}

struct Inner {
    brokers: String,
    producer: FutureProducer,
    op_timeout: Duration,
    consumers: Mutex<HashMap<String, Arc<StreamConsumer>>>,
    /// Dead letters settled by this process; the durable copy is on the
    /// queue's dead-letter topic.
    dead: Mutex<HashMap<String, Vec<DeadLetter>>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("brokers", &self.inner.brokers)
            .field("queues", &self.inner.consumers.lock().len())
            .finish_non_exhaustive()
    }
}

fn unavailable(e: KafkaError) -> BusError {
    BusError::Unavailable(e.to_string())
}

impl KafkaBroker {
    /// Create a producer for `brokers` (comma-separated `host:port` list).
    ///
    /// librdkafka connects lazily, so an unreachable cluster surfaces on the
    /// first publish or consume rather than here.
    ///
    /// # Errors
    /// Returns [`BusError::Unavailable`] if the client configuration is
    /// rejected.
    pub fn connect(brokers: &str, op_timeout: Duration) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", op_timeout.as_millis().max(1).to_string())
            .set("enable.idempotence", "true")
            .create()
            .map_err(unavailable)?;
        info!(brokers, "Connected to Kafka event bus");

        Ok(Self {
            inner: Arc::new(Inner {
                brokers: brokers.to_string(),
                producer,
                op_timeout,
                consumers: Mutex::new(HashMap::new()),
                dead: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        })
    }

    /// Stop handing out deliveries, waking every waiting consumer.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.shutdown.notify_waiters();
        info!("Kafka broker closed");
    }

    fn consumer(&self, queue: &str) -> Result<Arc<StreamConsumer>, BusError> {
        self.inner
            .consumers
            .lock()
            .get(queue)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }
}

impl Inner {
    async fn send(
        &self,
        topic: &str,
        message: &Message,
        headers: OwnedHeaders,
    ) -> Result<(), BusError> {
        let key = message.id.to_string();
        let record = FutureRecord::to(topic)
            .key(&key)
            .payload(&message.body)
            .timestamp(message.published_at.timestamp_millis())
            .headers(headers);

        match self.producer.send(record, self.op_timeout).await {
            Ok(_) => Ok(()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut), _)) => {
                Err(BusError::Timeout {
                    operation: "publish",
                    timeout: self.op_timeout,
                })
            }
            Err((e, _)) => Err(unavailable(e)),
        }
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<Uuid, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let message = Message::new(topic, body);
        self.inner
            .send(topic, &message, envelope_headers(topic, 1))
            .await?;
        debug!(topic, message_id = %message.id, "Message published");
        Ok(message.id)
    }

    async fn declare_queue(&self, topic: &str, queue: &str) -> Result<(), BusError> {
        if self.inner.consumers.lock().contains_key(queue) {
            debug!(topic, queue, "Queue already bound, joining as competing consumer");
            return Ok(());
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.inner.brokers)
            .set("group.id", queue)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(unavailable)?;
        let retry = retry_topic(queue);
        consumer
            .subscribe(&[topic, retry.as_str()])
            .map_err(unavailable)?;

        self.inner
            .consumers
            .lock()
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(consumer));
        info!(topic, queue, "Durable queue bound");
        Ok(())
    }

    async fn next_delivery(&self, queue: &str) -> Result<Delivery, BusError> {
        let consumer = self.consumer(queue)?;
        let shutdown = self.inner.shutdown.notified();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let received = tokio::select! {
            received = consumer.recv() => received.map_err(unavailable)?.detach(),
            () = shutdown => return Err(BusError::Closed),
        };
        let envelope = Envelope::decode(&received);

        let wait = envelope.wait(Utc::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let settlement: Arc<dyn Acknowledger> = Arc::new(Settlement {
            inner: Arc::clone(&self.inner),
            consumer,
            position: envelope.position,
        });
        Ok(Delivery::new(
            queue,
            envelope.message,
            envelope.attempt,
            settlement,
        ))
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, BusError> {
        self.consumer(queue)?;
        Ok(self
            .inner
            .dead
            .lock()
            .get(queue)
            .cloned()
            .unwrap_or_default())
    }
}

/// Headers every copy of a message carries.
fn envelope_headers(origin_topic: &str, attempt: u32) -> OwnedHeaders {
    let attempt = attempt.to_string();
    OwnedHeaders::new()
        .insert(Header {
            key: ORIGIN_TOPIC_HEADER,
            value: Some(origin_topic),
        })
        .insert(Header {
            key: ATTEMPT_HEADER,
            value: Some(attempt.as_str()),
        })
}

fn header<'a>(headers: Option<&'a OwnedHeaders>, name: &str) -> Option<&'a str> {
    headers?
        .iter()
        .find(|h| h.key == name)
        .and_then(|h| h.value)
        .and_then(|v| std::str::from_utf8(v).ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Position {
    topic: String,
    partition: i32,
    offset: i64,
}

/// A received Kafka record translated back into bus terms.
#[derive(Debug)]
struct Envelope {
    message: Message,
    attempt: u32,
    not_before: Option<DateTime<Utc>>,
    position: Position,
}

impl Envelope {
    fn decode(record: &OwnedMessage) -> Self {
        let headers = record.headers();
        let id = record
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .and_then(|k| Uuid::parse_str(k).ok())
            .unwrap_or_else(Uuid::new_v4);
        let published_at = record
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Self {
            message: Message {
                id,
                topic: header(headers, ORIGIN_TOPIC_HEADER)
                    .unwrap_or(record.topic())
                    .to_string(),
                body: record.payload().unwrap_or_default().to_vec(),
                published_at,
            },
            attempt: header(headers, ATTEMPT_HEADER)
                .and_then(|a| a.parse().ok())
                .unwrap_or(1),
            not_before: header(headers, NOT_BEFORE_HEADER)
                .and_then(|ms| ms.parse().ok())
                .and_then(DateTime::from_timestamp_millis),
            position: Position {
                topic: record.topic().to_string(),
                partition: record.partition(),
                offset: record.offset(),
            },
        }
    }

    /// How long a delayed redelivery still has to wait at `now`.
    fn wait(&self, now: DateTime<Utc>) -> Duration {
        self.not_before
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// Settles one Kafka delivery by committing past its offset.
struct Settlement {
    inner: Arc<Inner>,
    consumer: Arc<StreamConsumer>,
    position: Position,
}

fn commit(consumer: &StreamConsumer, position: &Position) {
    let mut offsets = TopicPartitionList::new();
    let added = offsets.add_partition_offset(
        &position.topic,
        position.partition,
        Offset::Offset(position.offset + 1),
    );
    if let Err(e) = added.and_then(|()| consumer.commit(&offsets, CommitMode::Async)) {
        warn!(topic = %position.topic, offset = position.offset, error = %e, "Offset commit failed");
    }
}

impl Settlement {
    /// Write `message` to `topic`, then commit the original offset.
    fn forward(&self, topic: String, message: Message, headers: OwnedHeaders) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(topic, message_id = %message.id, "No runtime to forward delivery; it will be redelivered");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let consumer = Arc::clone(&self.consumer);
        let position = self.position.clone();
        runtime.spawn(async move {
            match inner.send(&topic, &message, headers).await {
                Ok(()) => commit(&consumer, &position),
                Err(e) => error!(
                    topic,
                    message_id = %message.id,
                    error = %e,
                    "Forwarding delivery failed; offset left uncommitted"
                ),
            }
        });
    }
}

impl Acknowledger for Settlement {
    fn ack(&self, _queue: &str, _message: &Message, _attempt: u32) {
        commit(&self.consumer, &self.position);
    }

    fn requeue(&self, queue: &str, message: Message, attempt: u32, delay: Duration) {
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let not_before = not_before.timestamp_millis().to_string();
        let headers = envelope_headers(&message.topic, attempt + 1).insert(Header {
            key: NOT_BEFORE_HEADER,
            value: Some(not_before.as_str()),
        });
        debug!(queue, message_id = %message.id, attempt, ?delay, "Requeued via retry topic");
        self.forward(retry_topic(queue), message, headers);
    }

    fn dead_letter(&self, queue: &str, message: Message, attempt: u32, reason: String) {
        let headers = envelope_headers(&message.topic, attempt).insert(Header {
            key: REASON_HEADER,
            value: Some(reason.as_str()),
        });
        self.inner
            .dead
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push(DeadLetter {
                message: message.clone(),
                queue: queue.to_string(),
                attempts: attempt,
                reason,
                dead_lettered_at: Utc::now(),
            });
        self.forward(dead_letter_topic(queue), message, headers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::Timestamp;

    fn record(topic: &str, key: Option<&str>, headers: Option<OwnedHeaders>) -> OwnedMessage {
        OwnedMessage::new(
            Some(b"{\"postId\":\"p1\"}".to_vec()),
            key.map(|k| k.as_bytes().to_vec()),
            topic.to_string(),
            Timestamp::CreateTime(1_700_000_000_000),
            3,
            42,
            headers,
        )
    }

    #[test]
    fn test_side_topics_are_named_after_the_queue() {
        assert_eq!(
            retry_topic("search-service.post.created"),
            "search-service.post.created.retry"
        );
        assert_eq!(
            dead_letter_topic("media-service.post.deleted"),
            "media-service.post.deleted.dead-letter"
        );
    }

    #[test]
    fn test_first_delivery_decodes_from_plain_record() {
        let id = Uuid::new_v4();
        let envelope = Envelope::decode(&record(
            "post.created",
            Some(&id.to_string()),
            Some(envelope_headers("post.created", 1)),
        ));

        assert_eq!(envelope.message.id, id);
        assert_eq!(envelope.message.topic, "post.created");
        assert_eq!(envelope.message.body, b"{\"postId\":\"p1\"}");
        assert_eq!(envelope.message.published_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.wait(Utc::now()), Duration::ZERO);
        assert_eq!(
            envelope.position,
            Position {
                topic: "post.created".into(),
                partition: 3,
                offset: 42,
            }
        );
    }

    #[test]
    fn test_retry_copy_keeps_origin_topic_and_attempt() {
        let id = Uuid::new_v4();
        let not_before = Utc::now() + chrono::Duration::seconds(5);
        let headers = envelope_headers("post.created", 2).insert(Header {
            key: NOT_BEFORE_HEADER,
            value: Some(not_before.timestamp_millis().to_string().as_str()),
        });
        let envelope = Envelope::decode(&record(
            "search-service.post.created.retry",
            Some(&id.to_string()),
            Some(headers),
        ));

        assert_eq!(envelope.message.id, id);
        assert_eq!(envelope.message.topic, "post.created");
        assert_eq!(envelope.attempt, 2);
        assert_eq!(envelope.position.topic, "search-service.post.created.retry");
        let wait = envelope.wait(Utc::now());
        assert!(wait > Duration::from_secs(4) && wait <= Duration::from_secs(5));
        assert_eq!(envelope.wait(not_before + chrono::Duration::seconds(1)), Duration::ZERO);
    }

    #[test]
    fn test_foreign_record_gets_defaults() {
        let envelope = Envelope::decode(&record("post.deleted", Some("not-a-uuid"), None));
        assert_eq!(envelope.message.topic, "post.deleted");
        assert_eq!(envelope.attempt, 1);
        assert!(envelope.not_before.is_none());
        assert!(!envelope.message.id.is_nil());
    }

    #[tokio::test]
    async fn test_consuming_undeclared_queue_fails() {
        let broker = KafkaBroker::connect("localhost:9092", Duration::from_secs(2)).unwrap();
        assert_eq!(
            broker.next_delivery("nobody").await.unwrap_err(),
            BusError::UnknownQueue("nobody".into())
        );
        assert!(matches!(
            broker.dead_letters("nobody").await,
            Err(BusError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_after_close_is_rejected() {
        let broker = KafkaBroker::connect("localhost:9092", Duration::from_secs(2)).unwrap();
        broker.close();
        assert_eq!(
            broker.publish("post.created", b"{}".to_vec()).await.unwrap_err(),
            BusError::Closed
        );
    }
}
