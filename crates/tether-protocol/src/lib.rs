//! # tether-protocol
//!
//! Wire protocol definitions for the Tether realtime client.
//!
//! The RPC envelope is fixed by the server collaborator; this crate provides
//! the typed building blocks for it:
//!
//! - **Subject** - canonical, ACL-qualified identity of a message stream
//! - **Message** - a delivered message with server-assigned ordering id
//! - **Command** - the command set accepted by the `/api` endpoint
//! - **Envelope** / **RpcResponse** - the batched request/response envelope
//! - **ServerEvent** - typed inbound events with a forward-compatible parse
//!
//! Everything here is plain serde data; no I/O.

pub mod command;
pub mod envelope;
pub mod event;
pub mod message;
pub mod subject;

pub use command::Command;
pub use envelope::{CommandResponse, CommandResult, Envelope, RpcResponse, Status};
pub use event::ServerEvent;
pub use message::{Message, MessageId};
pub use subject::Subject;

use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event carried an `eventType` this client does not know.
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    /// Event lacked the `eventType` discriminator.
    #[error("Event has no eventType field")]
    MissingEventType,
}
