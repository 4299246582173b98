//! Inbound server events.
//!
//! Events arrive from two sources (inline in an RPC response, or pushed
//! over the realtime channel) but share one shape, discriminated by
//! `eventType`. Unknown types must not break the session, so parsing goes
//! through [`ServerEvent::parse`] which separates "unknown" from "malformed".

use crate::message::MessageId;
use crate::subject::Subject;
use crate::{Message, ProtocolError};
use serde::{Deserialize, Serialize};

/// A typed server event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A user is associated with this session.
    Login {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        google_user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
    },

    /// No user is associated with this session.
    Logout,

    /// A message delivered on a subscribed subject.
    Message(Message),

    /// A message pinned on a subscribed subject.
    Pin(Message),

    /// A pin removed.
    Unpin {
        subject: Subject,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },

    /// Server-initiated session teardown.
    Close,
}

const KNOWN_EVENT_TYPES: &[&str] = &["login", "logout", "message", "pin", "unpin", "close"];

impl ServerEvent {
    /// Parse a raw event, distinguishing unknown event kinds from malformed
    /// payloads.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::MissingEventType`] if the discriminator is absent,
    /// [`ProtocolError::UnknownEvent`] for a type this client does not know,
    /// and [`ProtocolError::Json`] for a known type with a bad payload.
    pub fn parse(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        let event_type = value
            .get("eventType")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingEventType)?;

        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Err(ProtocolError::UnknownEvent(event_type.to_string()));
        }

        Ok(serde_json::from_value(value.clone())?)
    }

    /// The `profile` field carried on this raw event, if any.
    ///
    /// Any event may carry a profile assignment, independent of its type,
    /// so this reads the raw value rather than the typed variant.
    #[must_use]
    pub fn profile_of(value: &serde_json::Value) -> Option<&str> {
        value.get("profile").and_then(|p| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_message_event() {
        let event = ServerEvent::parse(&json!({
            "eventType": "message",
            "id": 3,
            "created": 1.0,
            "subject": {"name": "chat"},
            "message": "hi"
        }))
        .unwrap();

        match event {
            ServerEvent::Message(msg) => {
                assert_eq!(msg.id, Some(3));
                assert_eq!(msg.subject, Subject::new("chat"));
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_login_event() {
        let event = ServerEvent::parse(&json!({
            "eventType": "login",
            "googleUser": "a@example.com",
            "profile": "p-1"
        }))
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::Login {
                google_user: Some("a@example.com".to_string()),
                profile: Some("p-1".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let err = ServerEvent::parse(&json!({"eventType": "hologram"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(t) if t == "hologram"));
    }

    #[test]
    fn test_missing_event_type() {
        let err = ServerEvent::parse(&json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingEventType));
    }

    #[test]
    fn test_profile_on_any_event() {
        let raw = json!({"eventType": "logout", "profile": "p-2"});
        assert_eq!(ServerEvent::profile_of(&raw), Some("p-2"));
        assert!(ServerEvent::parse(&raw).is_ok());
    }
}
