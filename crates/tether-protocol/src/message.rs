//! Message types for Tether.

use crate::subject::Subject;
use serde::{Deserialize, Serialize};

/// Server-assigned, monotonic-per-subject message identifier.
pub type MessageId = u64;

/// A message delivered on a subject.
///
/// Immutable once delivered; the ordering key is `id` ascending. Messages
/// originating locally (local subjects, not-yet-acked sends) have no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id; absent for local messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Creation timestamp, seconds since the epoch.
    #[serde(default)]
    pub created: f64,

    /// Profile id of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Subject this message was delivered on.
    pub subject: Subject,

    /// Arbitrary payload.
    pub message: serde_json::Value,

    /// Client-generated idempotency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_message_id: Option<String>,

    /// Key for latest-per-key tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Message {
    /// Create a local message with no server id.
    #[must_use]
    pub fn local(subject: Subject, message: serde_json::Value) -> Self {
        Self {
            id: None,
            created: epoch_seconds(),
            sender: None,
            subject,
            message,
            sender_message_id: None,
            key: None,
        }
    }

    /// Attach a latest-per-key key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach a sender message id.
    #[must_use]
    pub fn with_sender_message_id(mut self, id: impl Into<String>) -> Self {
        self.sender_message_id = Some(id.into());
        self
    }
}

/// Current time as fractional seconds since the epoch.
#[must_use]
pub fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_message_has_no_id() {
        let msg = Message::local("chat".into(), json!("hi"));
        assert!(msg.id.is_none());
        assert!(msg.created > 0.0);
    }

    #[test]
    fn test_deserialize_server_message() {
        let msg: Message = serde_json::from_value(json!({
            "id": 12,
            "created": 1409000000.5,
            "sender": "profile-1",
            "subject": {"name": "chat"},
            "message": "hello",
            "senderMessageId": "uuid-1"
        }))
        .unwrap();

        assert_eq!(msg.id, Some(12));
        assert_eq!(msg.subject, Subject::new("chat"));
        assert_eq!(msg.sender_message_id.as_deref(), Some("uuid-1"));
        assert!(msg.key.is_none());
    }
}
