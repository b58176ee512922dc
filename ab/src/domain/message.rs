//! Message envelope types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AgentId, Priority};

/// What a message is: a request for work, a reply, or a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Event,
}

/// How a consumer classifies a processing failure when nacking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Worth retrying with backoff
    Transient,
    /// Unrecoverable - goes straight to the dead-letter queue
    Permanent,
}

/// A message addressed to one agent
///
/// Immutable after construction except `attempt_count`, which only the
/// Coordinator mutates while rescheduling retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message id (UUIDv7)
    pub id: String,
    pub sender: AgentId,
    pub recipient: AgentId,
    #[serde(rename = "message-type")]
    pub message_type: MessageType,
    /// Opaque payload - the bus never interprets it
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Number of failed delivery attempts so far
    #[serde(rename = "attempt-count")]
    pub attempt_count: u32,
    /// Creation timestamp (unix ms)
    #[serde(rename = "created-at")]
    pub created_at: i64,
}

impl AgentMessage {
    /// Create a normal-priority message
    pub fn new(sender: AgentId, recipient: AgentId, message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            sender,
            recipient,
            message_type,
            payload,
            priority: Priority::Normal,
            attempt_count: 0,
            created_at: msgstore::now_ms(),
        }
    }

    /// Set the delivery priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A received message together with its reservation token
///
/// The token is the consumer's proof of lease; it must be passed back
/// to ack or nack and is worthless once the lease expires.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: AgentMessage,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentKind;

    #[test]
    fn test_new_message_defaults() {
        let msg = AgentMessage::new(
            AgentId::of(AgentKind::Planner),
            AgentId::of(AgentKind::Worker),
            MessageType::Request,
            serde_json::json!({"task": "build"}),
        );

        assert_eq!(msg.priority, Priority::Normal);
        assert_eq!(msg.attempt_count, 0);
        assert!(msg.created_at > 0);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_with_priority() {
        let msg = AgentMessage::new(
            AgentId::of(AgentKind::Planner),
            AgentId::of(AgentKind::Worker),
            MessageType::Event,
            serde_json::Value::Null,
        )
        .with_priority(Priority::Critical);

        assert_eq!(msg.priority, Priority::Critical);
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = AgentMessage::new(
            AgentId::of(AgentKind::Worker),
            AgentId::of(AgentKind::Worker),
            MessageType::Event,
            serde_json::Value::Null,
        );
        let b = AgentMessage::new(
            AgentId::of(AgentKind::Worker),
            AgentId::of(AgentKind::Worker),
            MessageType::Event,
            serde_json::Value::Null,
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serde_round_trip_preserves_attempts() {
        let mut msg = AgentMessage::new(
            AgentId::of(AgentKind::Planner),
            AgentId::new(AgentKind::Worker, "w1"),
            MessageType::Request,
            serde_json::json!({"n": 1}),
        );
        msg.attempt_count = 3;

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("attempt-count"));

        let back: AgentMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.attempt_count, 3);
        assert_eq!(back.recipient.key(), "worker:w1");
    }
}
