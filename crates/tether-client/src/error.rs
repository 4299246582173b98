//! Client-facing errors.
//!
//! Transient conditions (network failures, server-signaled retries) never
//! appear here; they are retried internally. These are the errors a caller
//! can actually act on.

use tether_core::{RegistryError, StorageError};
use tether_protocol::CommandResult;
use thiserror::Error;

/// Errors surfaced by the [`Client`](crate::Client) API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server denied the operation (ACL).
    #[error("Access denied")]
    AccessDenied,

    /// The server rejected the operation with a non-ok, non-retry result.
    #[error("Rejected by server: {0:?}")]
    Rejected(CommandResult),

    /// The whole batch failed with a status this client does not know.
    #[error("Server returned status: {0}")]
    Server(String),

    /// Synchronous read against a subject with no subscription.
    #[error("Not subscribed to subject: {0}")]
    NotSubscribed(String),

    /// A pending subscribe was torn down by `unsubscribe`.
    #[error("Subscription cancelled by unsubscribe")]
    Unsubscribed,

    /// No pin with this id is held by this client.
    #[error("Unknown pin id: {0}")]
    UnknownPin(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The client was shut down.
    #[error("Client is shut down")]
    Shutdown,
}

impl From<RegistryError> for ClientError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotSubscribed(name) => ClientError::NotSubscribed(name),
        }
    }
}

impl ClientError {
    /// Map an explicit server rejection to the caller-facing error.
    #[must_use]
    pub(crate) fn rejection(result: CommandResult) -> Self {
        match result {
            CommandResult::AccessDenied => ClientError::AccessDenied,
            other => ClientError::Rejected(other),
        }
    }
}
