//! Persistent-channel message protocol.
//!
//! All frames are JSON-encoded. Outbound frames use snake_case type tags;
//! inbound record events carry dotted `<entity>.<action>` type names and the
//! affected record (or its id, for deletions) as the payload.

use serde::{Deserialize, Serialize};

/// Inbound event type for record creation.
pub const EVENT_RECORD_CREATED: &str = "record.created";
/// Inbound event type for record updates.
pub const EVENT_RECORD_UPDATED: &str = "record.updated";
/// Inbound event type for record deletion.
pub const EVENT_RECORD_DELETED: &str = "record.deleted";
/// Heartbeat type, used in both directions.
pub const HEARTBEAT: &str = "heartbeat";

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe to a topic.
    Join { topic: String },
    /// Unsubscribe from a topic.
    Leave { topic: String },
    /// Keep-alive.
    Heartbeat,
}

/// An inbound message: `{"type": "<entity>.<action>", "payload": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChannelEnvelope {
    /// Whether this is a keepalive rather than an event.
    pub fn is_heartbeat(&self) -> bool {
        self.kind == HEARTBEAT
    }
}

/// Kind of a subscription scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// Shared by every client
    Global,
    /// Scoped to one authenticated identity
    PerIdentity,
}

/// A named subscription scope on the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTopic {
    pub name: String,
    pub kind: TopicKind,
}

impl SubscriptionTopic {
    /// The global topic every client joins.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TopicKind::Global,
        }
    }

    /// The per-identity topic for the authenticated identity.
    pub fn per_identity(identity: &str) -> Self {
        Self {
            name: format!("user:{identity}"),
            kind: TopicKind::PerIdentity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_serialization() {
        let frame = ClientFrame::Join {
            topic: "records".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"join","topic":"records"}"#);

        let frame = ClientFrame::Heartbeat;
        assert_eq!(serde_json::to_string(&frame).unwrap(), r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn envelope_deserialization() {
        let json = r#"{"type": "record.updated", "payload": {"id": "list-1"}}"#;
        let envelope: ChannelEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind, EVENT_RECORD_UPDATED);
        assert_eq!(envelope.payload["id"], "list-1");
        assert!(!envelope.is_heartbeat());

        // Heartbeats come without a payload.
        let envelope: ChannelEnvelope = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(envelope.is_heartbeat());
    }

    #[test]
    fn per_identity_topic_is_keyed_by_identity() {
        let topic = SubscriptionTopic::per_identity("ana");
        assert_eq!(topic.name, "user:ana");
        assert_eq!(topic.kind, TopicKind::PerIdentity);

        let global = SubscriptionTopic::global("records");
        assert_eq!(global.kind, TopicKind::Global);
    }
}
