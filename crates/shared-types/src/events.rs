//! # Domain Events
//!
//! The envelope every service publishes on the bus, and the payload schemas
//! for each event type.
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "type": "post.deleted",
//!   "payload": { "postId": "p1", "userId": "u1", "mediaIds": ["m1", "m2"] },
//!   "producedAt": "2026-01-01T00:00:00Z",
//!   "idempotencyKey": "post.deleted:p1"
//! }
//! ```
//!
//! The idempotency key depends only on the event type and the entity id, so
//! publishing the same fact twice (or the broker redelivering it) yields the
//! same key.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::entities::{MediaId, PostId, UserId};

/// Errors raised while encoding or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    /// The bytes were not a valid event envelope.
    #[error("malformed event envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope named a different event type than the one requested.
    #[error("event type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: EventType, found: EventType },

    /// The payload did not match the schema of its declared type.
    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload { event_type: EventType, reason: String },
}

/// The named event types. The serialized name doubles as the bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "post.created")]
    PostCreated,
    #[serde(rename = "post.deleted")]
    PostDeleted,
}

impl EventType {
    /// Every known event type.
    pub const ALL: [EventType; 2] = [EventType::PostCreated, EventType::PostDeleted];

    /// The bus topic this event type is published on.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::PostCreated => "post.created",
            Self::PostDeleted => "post.deleted",
        }
    }

    /// Resolve a topic name back to its event type.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.topic() == topic)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// A typed event payload.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    /// The event type this payload belongs to.
    const TYPE: EventType;

    /// Identity of the entity the event is about.
    fn entity_id(&self) -> &str;
}

/// Payload of `post.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl EventPayload for PostCreated {
    const TYPE: EventType = EventType::PostCreated;

    fn entity_id(&self) -> &str {
        self.post_id.as_str()
    }
}

/// Payload of `post.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    pub post_id: PostId,
    pub user_id: UserId,
    #[serde(default)]
    pub media_ids: Vec<MediaId>,
}

impl EventPayload for PostDeleted {
    const TYPE: EventType = EventType::PostDeleted;

    fn entity_id(&self) -> &str {
        self.post_id.as_str()
    }
}

/// Deterministic idempotency key for an event about `entity_id`.
#[must_use]
pub fn idempotency_key(event_type: EventType, entity_id: &str) -> String {
    format!("{}:{}", event_type.topic(), entity_id)
}

/// Envelope for every event that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub produced_at: DateTime<Utc>,
    pub idempotency_key: String,
}

impl DomainEvent {
    /// Wrap a payload, stamping it with the current time.
    pub fn new<P: EventPayload>(payload: &P) -> Result<Self, EventError> {
        Self::produced_at(payload, Utc::now())
    }

    /// Wrap a payload with an explicit production timestamp.
    pub fn produced_at<P: EventPayload>(
        payload: &P,
        produced_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: P::TYPE,
            payload: serde_json::to_value(payload)?,
            produced_at,
            idempotency_key: idempotency_key(P::TYPE, payload.entity_id()),
        })
    }

    /// The topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.event_type.topic()
    }

    /// Decode the payload as `P`, checking the declared type first.
    pub fn decode<P: EventPayload>(&self) -> Result<P, EventError> {
        if self.event_type != P::TYPE {
            return Err(EventError::TypeMismatch {
                expected: P::TYPE,
                found: self.event_type,
            });
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| EventError::InvalidPayload {
            event_type: self.event_type,
            reason: e.to_string(),
        })
    }

    /// Serialize the envelope to its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an envelope from its JSON wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
