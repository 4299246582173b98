//! # tether-transport
//!
//! Transport seams for the Tether realtime client.
//!
//! Two independent paths reach the server:
//!
//! - **RpcBackend** - batched command requests over HTTP request/response
//! - **ChannelTransport** - the opaque server-push channel, opened with a
//!   server-issued token
//!
//! Both are traits so the session core stays transport-agnostic; tests run
//! against [`LocalTransport`] and an in-process backend.

pub mod backoff;
pub mod http;
pub mod local;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use backoff::Backoff;
pub use http::HttpRpc;
pub use local::{LocalChannelController, LocalTransport};
pub use traits::{ChannelHandle, ChannelSignal, ChannelTransport, RpcBackend, RpcError, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketChannel;
