//! Inbound event dispatch.
//!
//! Both event sources (inline RPC events and channel pushes) funnel through
//! [`dispatch`]. Unknown event types are logged and skipped, never fatal.
//! Store mutation happens before the corresponding client event is emitted,
//! so a listener that reads back synchronously sees the new state.

use crate::session::{self, Shared};
use std::sync::Arc;
use tether_core::ClientEvent;
use tether_protocol::{ProtocolError, ServerEvent};
use tracing::{debug, info, warn};

/// Apply one raw server event to the client state.
pub(crate) fn dispatch(shared: &Arc<Shared>, raw: &serde_json::Value) {
    // Any event may carry a profile assignment, regardless of its type.
    if let Some(profile) = ServerEvent::profile_of(raw) {
        shared.set_profile(profile);
    }

    let event = match ServerEvent::parse(raw) {
        Ok(event) => event,
        Err(ProtocolError::UnknownEvent(kind)) => {
            info!(kind, "Ignoring unknown event type");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Malformed server event");
            return;
        }
    };

    apply(shared, event);
}

fn apply(shared: &Arc<Shared>, event: ServerEvent) {
    match event {
        ServerEvent::Login { google_user, .. } => {
            shared.events.emit(ClientEvent::Login { google_user });
        }
        ServerEvent::Logout => {
            shared.events.emit(ClientEvent::Logout);
        }
        ServerEvent::Message(message) => {
            let inserted = shared
                .registry
                .with_mut(&message.subject, |sub| sub.insert_message(message.clone()));
            match inserted {
                Ok(true) => shared.events.emit(ClientEvent::Message(message)),
                // Redelivery; already stored and already announced.
                Ok(false) => {}
                Err(_) => {
                    debug!(subject = %message.subject.name, "Message for unsubscribed subject");
                }
            }
        }
        ServerEvent::Pin(message) => {
            let inserted = shared
                .registry
                .with_mut(&message.subject, |sub| sub.insert_pin(message.clone()));
            match inserted {
                Ok(true) => shared.events.emit(ClientEvent::Pin(message)),
                Ok(false) => {}
                Err(_) => {
                    debug!(subject = %message.subject.name, "Pin for unsubscribed subject");
                }
            }
        }
        ServerEvent::Unpin {
            subject,
            sender_message_id,
            id,
        } => {
            let removed = shared.registry.with_mut(&subject, |sub| {
                sub.remove_pin(sender_message_id.as_deref(), id)
            });
            match removed {
                Ok(Some(pin)) => shared.events.emit(ClientEvent::Unpin {
                    subject,
                    sender_message_id: pin.sender_message_id,
                    id: pin.id,
                }),
                // Already gone, e.g. synthesized away on a disconnect.
                Ok(None) => {}
                Err(_) => {
                    debug!(subject = %subject.name, "Unpin for unsubscribed subject");
                }
            }
        }
        ServerEvent::Close => {
            shared.events.emit(ClientEvent::Close);
            session::force_close(shared);
        }
    }
}
