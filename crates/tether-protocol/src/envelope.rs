//! RPC request and response envelopes.
//!
//! The client batches commands into one POST; the server replies with one
//! positionally-aligned result per command plus a flat event stream.

use crate::command::Command;
use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Batched RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Per-process instance id (channel addressing).
    pub instance_id: String,

    /// Durable client identity token, once assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Cached user-association token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_user_id: Option<String>,

    /// Commands, answered positionally.
    pub commands: Vec<Command>,
}

/// Batch-level response status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Ok,
    /// Resubmit the whole batch immediately, discarding backoff.
    Retry,
    Other(String),
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ok" => Status::Ok,
            "retry" => Status::Retry,
            _ => Status::Other(s),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => "ok".to_string(),
            Status::Retry => "retry".to_string(),
            Status::Other(s) => s,
        }
    }
}

/// Per-command result code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandResult {
    Ok,
    /// Resubmit this command after backoff.
    Retry,
    /// Idempotent duplicate; treated as success.
    DuplicateMessage,
    AccessDenied,
    Other(String),
}

impl CommandResult {
    /// Whether this result acknowledges the command (including the
    /// idempotent-duplicate case).
    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, CommandResult::Ok | CommandResult::DuplicateMessage)
    }
}

impl From<String> for CommandResult {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ok" => CommandResult::Ok,
            "retry" => CommandResult::Retry,
            "duplicate_message" => CommandResult::DuplicateMessage,
            "access_denied" => CommandResult::AccessDenied,
            _ => CommandResult::Other(s),
        }
    }
}

impl From<CommandResult> for String {
    fn from(result: CommandResult) -> Self {
        match result {
            CommandResult::Ok => "ok".to_string(),
            CommandResult::Retry => "retry".to_string(),
            CommandResult::DuplicateMessage => "duplicate_message".to_string(),
            CommandResult::AccessDenied => "access_denied".to_string(),
            CommandResult::Other(s) => s,
        }
    }
}

/// Response to a single command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub result: CommandResult,

    /// Channel token (createChannel).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// The stored message (sendMessage, including the duplicate case).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// The stored pin (pin).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<Message>,
}

impl CommandResponse {
    /// A bare result with no attachments.
    #[must_use]
    pub fn of(result: CommandResult) -> Self {
        Self {
            result,
            token: None,
            message: None,
            pin: None,
        }
    }
}

/// Batched RPC response.
///
/// Events are kept as raw JSON here so the dispatcher can apply its
/// forward-compatible parse (and profile extraction) uniformly for both the
/// inline path and the channel path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_user_id: Option<String>,

    /// Current profile id, when the session has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Events hoisted out of command results into one stream.
    #[serde(default)]
    pub events: Vec<serde_json::Value>,

    /// One response per submitted command, positionally aligned.
    #[serde(default)]
    pub responses: Vec<CommandResponse>,
}
