//! Typed client events.
//!
//! The facade exposes one fixed set of event kinds over a broadcast
//! channel; listeners subscribe explicitly and receive strongly-typed
//! payloads. Dynamic callback dictionaries are deliberately absent.

use tether_protocol::{Message, MessageId, Subject};
use tokio::sync::broadcast;
use tracing::trace;

/// Default buffered event capacity per listener.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An event observable by library users.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The realtime channel reached the Open state.
    Connect,
    /// The realtime channel closed (reconnect may follow).
    Disconnect,
    /// A user is associated with this session.
    Login { google_user: Option<String> },
    /// No user is associated with this session.
    Logout,
    /// A message was delivered.
    Message(Message),
    /// A message was pinned.
    Pin(Message),
    /// A pin was removed (explicitly, or synthesized on disconnect).
    Unpin {
        subject: Subject,
        sender_message_id: Option<String>,
        id: Option<MessageId>,
    },
    /// Server-initiated session teardown.
    Close,
}

/// Broadcast fan-out of [`ClientEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a bus with a specific per-listener capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all listeners. Having no listeners is fine.
    pub fn emit(&self, event: ClientEvent) {
        trace!(?event, "Emitting client event");
        let _ = self.tx.send(event);
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(ClientEvent::Connect);
        assert!(matches!(rx.recv().await.unwrap(), ClientEvent::Connect));
    }

    #[test]
    fn test_emit_without_listeners_is_ok() {
        let bus = EventBus::new();
        bus.emit(ClientEvent::Close);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_all_listeners_see_events() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(ClientEvent::Logout);
        assert!(matches!(a.recv().await.unwrap(), ClientEvent::Logout));
        assert!(matches!(b.recv().await.unwrap(), ClientEvent::Logout));
    }
}
