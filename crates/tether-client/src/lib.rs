//! # tether-client
//!
//! Reconnect-resilient pub/sub client with durable at-least-once delivery.
//!
//! A [`Client`] speaks to the service over two paths: batched command RPCs
//! (HTTP POST) and an opaque server-push channel opened with a server-issued
//! token. Transient failures never surface to callers; the RPC driver
//! retries with capped exponential backoff and the session re-establishes
//! the channel, resubscribes from each subject's resume cursor, and
//! re-asserts held pins.
//!
//! ```no_run
//! use tether_client::{Client, ClientConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = Client::new(ClientConfig::load()?)?;
//! client.connect()?;
//!
//! let mut events = client.events();
//! client.subscribe_with("chat", -1, None, None).await?;
//! client.send_message("chat", serde_json::json!("hello")).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod dispatcher;
mod error;
mod rpc;
mod session;

pub use client::Client;
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::ChannelState;

pub use tether_core::{
    ClientEvent, FileStorage, MemoryStorage, Storage, StorageError, SubscriptionState,
};
pub use tether_protocol::{Message, MessageId, Subject};
pub use tether_transport::{
    ChannelHandle, ChannelSignal, ChannelTransport, RpcBackend, RpcError, TransportError,
};

#[cfg(feature = "websocket")]
pub use tether_transport::WebSocketChannel;
