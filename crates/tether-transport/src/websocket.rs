//! WebSocket channel implementation.
//!
//! Interprets the server-issued channel token as a WebSocket URL and
//! surfaces the socket lifecycle as [`ChannelSignal`]s.

use crate::traits::{ChannelHandle, ChannelSignal, ChannelTransport, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

/// WebSocket-backed [`ChannelTransport`].
#[derive(Debug, Default)]
pub struct WebSocketChannel;

impl WebSocketChannel {
    /// Create the transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelTransport for WebSocketChannel {
    async fn open(&self, token: &str) -> Result<Box<dyn ChannelHandle>, TransportError> {
        let (stream, _) = connect_async(token)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;

        debug!(token, "WebSocket channel connected");

        Ok(Box::new(WebSocketHandle {
            stream,
            opened_sent: false,
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

struct WebSocketHandle {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    opened_sent: bool,
    closed: bool,
}

#[async_trait]
impl ChannelHandle for WebSocketHandle {
    async fn next(&mut self) -> Option<ChannelSignal> {
        if self.closed {
            return None;
        }
        if !self.opened_sent {
            self.opened_sent = true;
            return Some(ChannelSignal::Open);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(ChannelSignal::Message(text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Some(ChannelSignal::Message(text)),
                    Err(_) => {
                        warn!("Dropping non-UTF-8 channel payload");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!(error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Some(ChannelSignal::Closed);
                }
                Some(Err(e)) => {
                    return Some(ChannelSignal::Error {
                        description: e.to_string(),
                        code: None,
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close");
        }
    }
}
