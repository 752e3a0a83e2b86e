//! Broker-level message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published message as the broker stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Broker-assigned id, stable across redeliveries.
    pub id: Uuid,
    pub topic: String,
    pub body: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

impl Message {
    pub(crate) fn new(topic: &str, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            body,
            published_at: Utc::now(),
        }
    }
}

/// A message parked after it could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message: Message,
    /// Queue the message was consumed from.
    pub queue: String,
    /// Deliveries attempted before giving up.
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}
