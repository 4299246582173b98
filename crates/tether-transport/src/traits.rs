//! Transport abstraction traits.
//!
//! The realtime channel is an external collaborator: the client opens it
//! with a server-issued token and consumes a signal stream. Its internal
//! transport is out of scope here.

use async_trait::async_trait;
use std::time::Duration;
use tether_protocol::{Envelope, RpcResponse};
use thiserror::Error;

/// Channel transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused or failed to open a channel.
    #[error("Channel open failed: {0}")]
    Open(String),

    /// The transport is no longer usable.
    #[error("Transport closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// RPC backend errors. All of these are transient from the session's point
/// of view; the RPC driver retries them with backoff.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never completed.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response, possibly carrying a `Retry-After` hint.
    #[error("HTTP status {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// The response body was not a valid envelope.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Server-suggested retry delay, if the failure carried one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RpcError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Signals emitted by an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The underlying socket opened.
    Open,
    /// A pushed event, as a raw JSON string.
    Message(String),
    /// A transport-level error; the channel usually closes next.
    Error {
        description: String,
        code: Option<i64>,
    },
    /// The underlying socket closed.
    Closed,
}

/// Factory for realtime channels.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a channel with a server-issued token.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened; the session treats
    /// this like an immediate close and reconnects.
    async fn open(&self, token: &str) -> Result<Box<dyn ChannelHandle>, TransportError>;

    /// Transport name (e.g. "websocket", "local").
    fn name(&self) -> &'static str;
}

/// An open channel.
#[async_trait]
pub trait ChannelHandle: Send {
    /// Next signal from the channel.
    ///
    /// Returns `None` once the channel is gone; callers treat that as
    /// [`ChannelSignal::Closed`].
    async fn next(&mut self) -> Option<ChannelSignal>;

    /// Close the channel. Idempotent.
    async fn close(&mut self);
}

/// One-shot execution of an RPC envelope.
///
/// Implementations perform exactly one network attempt per call; batching,
/// retry and backoff live in the session's RPC driver.
#[async_trait]
pub trait RpcBackend: Send + Sync {
    /// POST the envelope and decode the response.
    ///
    /// # Errors
    ///
    /// Any [`RpcError`]; the caller retries with backoff.
    async fn execute(&self, envelope: &Envelope) -> Result<RpcResponse, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_on_http_errors() {
        let err = RpcError::Http {
            status: 503,
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        assert_eq!(RpcError::Network("boom".into()).retry_after(), None);
    }
}
