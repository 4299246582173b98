//! # tether-core
//!
//! Client-held state for the Tether realtime client.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Subscription** - per-subject message history, pins, latest-per-key
//! - **Registry** - canonical-subject-keyed subscription tracking
//! - **Outbox** - durable queue of not-yet-acknowledged outgoing messages
//! - **Storage** - per-namespace key/value persistence (file or memory)
//! - **EventBus** - typed client events over a broadcast channel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Dispatcher  │────▶│  Registry   │────▶│ Subscription │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  EventBus   │     │   Outbox    │──▶ Storage
//! └─────────────┘     └─────────────┘
//! ```

pub mod events;
pub mod outbox;
pub mod registry;
pub mod storage;
pub mod subscription;

pub use events::{ClientEvent, EventBus};
pub use outbox::{Outbox, OutboxEntry};
pub use registry::{Registry, RegistryError};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use subscription::{Subscription, SubscriptionState};
