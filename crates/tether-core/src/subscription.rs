//! Per-subject subscription state.
//!
//! A subscription owns the ordered, deduplicated message history for one
//! subject, the set of currently pinned messages, and the latest message
//! per key.

use std::collections::HashMap;
use tether_protocol::{Message, MessageId, Subject};
use tracing::trace;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered locally, server ack outstanding.
    Pending,
    /// Server acknowledged; messages flow.
    Active,
}

/// Client-side state for one subscribed subject.
#[derive(Debug)]
pub struct Subscription {
    subject: Subject,
    state: SubscriptionState,
    /// Sorted ascending by id at all times.
    messages: Vec<Message>,
    /// Dedup by id, insertion order.
    pins: Vec<Message>,
    /// Latest message per key.
    keys: HashMap<String, Message>,
}

impl Subscription {
    /// Create a pending subscription.
    #[must_use]
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            state: SubscriptionState::Pending,
            messages: Vec::new(),
            pins: Vec::new(),
            keys: HashMap::new(),
        }
    }

    /// The subject this subscription tracks.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Mark the subscription acknowledged by the server.
    pub fn activate(&mut self) {
        self.state = SubscriptionState::Active;
    }

    /// Insert a delivered message, keeping the sequence sorted by id.
    ///
    /// Messages usually arrive in order, so the insertion point is found by
    /// reverse scan: the rightmost existing message with a smaller id.
    /// Returns `false` if a message with the same id is already stored.
    pub fn insert_message(&mut self, message: Message) -> bool {
        let index = match message.id {
            Some(id) => {
                if self.messages.iter().any(|m| m.id == Some(id)) {
                    trace!(subject = %self.subject.name, id, "Duplicate message discarded");
                    return false;
                }
                self.insertion_point(id)
            }
            // Local messages carry no server id; append in arrival order.
            None => self.messages.len(),
        };

        if let Some(key) = message.key.clone() {
            self.keys.insert(key, message.clone());
        }
        self.messages.insert(index, message);
        true
    }

    fn insertion_point(&self, id: MessageId) -> usize {
        for (index, existing) in self.messages.iter().enumerate().rev() {
            match existing.id {
                Some(existing_id) if existing_id < id => return index + 1,
                _ => {}
            }
        }
        0
    }

    /// Track a pinned message. Returns `false` on a duplicate id.
    pub fn insert_pin(&mut self, message: Message) -> bool {
        let duplicate = message.id.is_some() && self.pins.iter().any(|p| p.id == message.id);
        if duplicate {
            trace!(subject = %self.subject.name, "Duplicate pin discarded");
            return false;
        }
        self.pins.push(message);
        true
    }

    /// Remove a tracked pin by sender message id or server id.
    ///
    /// Returns the removed pin, or `None` if nothing matched (already
    /// removed, e.g. by a synthesized disconnect-unpin).
    pub fn remove_pin(
        &mut self,
        sender_message_id: Option<&str>,
        id: Option<MessageId>,
    ) -> Option<Message> {
        let position = self.pins.iter().position(|p| {
            let by_token = match (sender_message_id, p.sender_message_id.as_deref()) {
                (Some(wanted), Some(held)) => wanted == held,
                _ => false,
            };
            let by_id = id.is_some() && p.id == id;
            by_token || by_id
        })?;
        Some(self.pins.remove(position))
    }

    /// Drain every tracked pin (channel disconnect).
    pub fn take_pins(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.pins)
    }

    /// All messages, ordered by id ascending.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Resume cursor: the highest server-assigned id seen on this subject.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.iter().rev().find_map(|m| m.id)
    }

    /// Currently pinned messages.
    #[must_use]
    pub fn pins(&self) -> &[Message] {
        &self.pins
    }

    /// Latest message carrying `key`.
    #[must_use]
    pub fn key_message(&self, key: &str) -> Option<&Message> {
        self.keys.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: u64) -> Message {
        Message {
            id: Some(id),
            created: id as f64,
            sender: None,
            subject: "chat".into(),
            message: json!(format!("m{id}")),
            sender_message_id: None,
            key: None,
        }
    }

    #[test]
    fn test_in_order_insertion() {
        let mut sub = Subscription::new("chat".into());
        assert!(sub.insert_message(msg(1)));
        assert!(sub.insert_message(msg(2)));
        assert!(sub.insert_message(msg(3)));

        let ids: Vec<_> = sub.messages().iter().map(|m| m.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sub.last_id(), Some(3));
    }

    #[test]
    fn test_out_of_order_insertion_stays_sorted() {
        let mut sub = Subscription::new("chat".into());
        for id in [5, 2, 9, 1, 7] {
            assert!(sub.insert_message(msg(id)));
        }
        let ids: Vec<_> = sub.messages().iter().map(|m| m.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 5, 7, 9]);
    }

    #[test]
    fn test_duplicate_id_discarded() {
        let mut sub = Subscription::new("chat".into());
        assert!(sub.insert_message(msg(4)));
        assert!(!sub.insert_message(msg(4)));
        assert_eq!(sub.messages().len(), 1);
    }

    #[test]
    fn test_local_messages_append() {
        let mut sub = Subscription::new("chat".into());
        sub.insert_message(msg(1));
        let local = Message::local("chat".into(), json!("draft"));
        assert!(sub.insert_message(local));
        assert_eq!(sub.messages().len(), 2);
        assert_eq!(sub.last_id(), Some(1));
    }

    #[test]
    fn test_key_tracking_keeps_latest() {
        let mut sub = Subscription::new("chat".into());
        sub.insert_message(msg(1).with_key("topic"));
        sub.insert_message(msg(2).with_key("topic"));

        let latest = sub.key_message("topic").unwrap();
        assert_eq!(latest.id, Some(2));
        assert!(sub.key_message("missing").is_none());
    }

    #[test]
    fn test_pin_dedup_and_removal() {
        let mut sub = Subscription::new("chat".into());
        let pin = msg(3).with_sender_message_id("uuid-3");
        assert!(sub.insert_pin(pin.clone()));
        assert!(!sub.insert_pin(pin));

        assert!(sub.remove_pin(Some("uuid-3"), None).is_some());
        // Second removal finds nothing
        assert!(sub.remove_pin(Some("uuid-3"), None).is_none());
    }

    #[test]
    fn test_take_pins_drains() {
        let mut sub = Subscription::new("chat".into());
        sub.insert_pin(msg(1));
        sub.insert_pin(msg(2));
        assert_eq!(sub.take_pins().len(), 2);
        assert!(sub.pins().is_empty());
    }
}
