//! Command set accepted by the server's `/api` endpoint.

use crate::message::MessageId;
use crate::subject::Subject;
use serde::{Deserialize, Serialize};

/// A single command inside an RPC envelope.
///
/// Serializes to `{"command": <name>, "arguments": {...}}` with the exact
/// names the server expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// Request a realtime channel token.
    CreateChannel,

    /// Subscribe to a subject.
    Subscribe {
        subject: Subject,
        /// 0 = no history, -1 = all history, N > 0 = most recent N.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        messages: Option<i64>,
        /// Resume cursor: only messages with id > last_id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_id: Option<MessageId>,
        /// Keys whose latest message should be delivered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
    },

    /// Tear down a subscription.
    Unsubscribe { subject: Subject },

    /// Publish a message.
    SendMessage {
        subject: Subject,
        message: serde_json::Value,
        sender_message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },

    /// Pin a message as ephemeral presence state.
    Pin {
        subject: Subject,
        message: serde_json::Value,
        sender_message_id: String,
    },

    /// Remove a pin.
    Unpin {
        subject: Subject,
        sender_message_id: String,
    },
}

impl Command {
    /// Wire name of this command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateChannel => "createChannel",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::SendMessage { .. } => "sendMessage",
            Command::Pin { .. } => "pin",
            Command::Unpin { .. } => "unpin",
        }
    }

    /// The subject this command targets, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&Subject> {
        match self {
            Command::CreateChannel => None,
            Command::Subscribe { subject, .. }
            | Command::Unsubscribe { subject }
            | Command::SendMessage { subject, .. }
            | Command::Pin { subject, .. }
            | Command::Unpin { subject, .. } => Some(subject),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_channel_wire_form() {
        let value = serde_json::to_value(Command::CreateChannel).unwrap();
        assert_eq!(value, json!({"command": "createChannel"}));
    }

    #[test]
    fn test_subscribe_wire_form() {
        let cmd = Command::Subscribe {
            subject: "chat".into(),
            messages: Some(-1),
            last_id: None,
            keys: None,
        };
        let value = serde_json::to_value(cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "subscribe",
                "arguments": {"subject": {"name": "chat"}, "messages": -1}
            })
        );
    }

    #[test]
    fn test_send_message_wire_form() {
        let cmd = Command::SendMessage {
            subject: "chat".into(),
            message: json!("hi"),
            sender_message_id: "uuid-1".to_string(),
            key: None,
        };
        let value = serde_json::to_value(cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "sendMessage",
                "arguments": {
                    "subject": {"name": "chat"},
                    "message": "hi",
                    "senderMessageId": "uuid-1"
                }
            })
        );
    }

    #[test]
    fn test_resume_cursor_serialized() {
        let cmd = Command::Subscribe {
            subject: "chat".into(),
            messages: None,
            last_id: Some(31),
            keys: None,
        };
        let value = serde_json::to_value(cmd).unwrap();
        assert_eq!(value["arguments"]["lastId"], json!(31));
    }
}
