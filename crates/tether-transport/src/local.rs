//! In-process channel transport.
//!
//! Used by tests and by hosts that feed channel traffic from elsewhere.
//! Each `open()` hands a [`LocalChannelController`] to the test side, which
//! drives the signal stream by hand.

use crate::traits::{ChannelHandle, ChannelSignal, ChannelTransport, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// In-process [`ChannelTransport`].
pub struct LocalTransport {
    opened: mpsc::UnboundedSender<LocalChannelController>,
}

impl LocalTransport {
    /// Create a transport and the stream of controllers for channels opened
    /// through it.
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<LocalChannelController>) {
        let (opened, controllers) = mpsc::unbounded_channel();
        (Self { opened }, controllers)
    }
}

#[async_trait]
impl ChannelTransport for LocalTransport {
    async fn open(&self, token: &str) -> Result<Box<dyn ChannelHandle>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = LocalChannelController {
            token: token.to_string(),
            tx,
        };
        self.opened
            .send(controller)
            .map_err(|_| TransportError::Closed)?;
        debug!(token, "Local channel opened");
        Ok(Box::new(LocalChannelHandle { rx }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Driver side of one opened local channel.
pub struct LocalChannelController {
    token: String,
    tx: mpsc::UnboundedSender<ChannelSignal>,
}

impl LocalChannelController {
    /// The token the channel was opened with.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Emit a raw signal. Returns `false` if the handle is gone.
    pub fn signal(&self, signal: ChannelSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    /// Emit the socket-opened signal.
    pub fn open(&self) -> bool {
        self.signal(ChannelSignal::Open)
    }

    /// Push an event, JSON-encoded.
    pub fn message(&self, event: &serde_json::Value) -> bool {
        self.signal(ChannelSignal::Message(event.to_string()))
    }

    /// Emit the socket-closed signal.
    pub fn close(&self) -> bool {
        self.signal(ChannelSignal::Closed)
    }
}

struct LocalChannelHandle {
    rx: mpsc::UnboundedReceiver<ChannelSignal>,
}

#[async_trait]
impl ChannelHandle for LocalChannelHandle {
    async fn next(&mut self) -> Option<ChannelSignal> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
