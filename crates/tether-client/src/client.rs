//! Public client facade.
//!
//! A [`Client`] is cheap to clone and safe to share; all state lives behind
//! one `Arc`. Commands issued before [`Client::connect`] queue locally and
//! are submitted in order once the client is ready.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::rpc::{self, Pending};
use crate::session::{self, ChannelState, HeldPin, Shared};
use std::collections::HashSet;
use std::sync::Arc;
use tether_core::{ClientEvent, OutboxEntry, Storage, SubscriptionState};
use tether_protocol::{Command, Message, MessageId, Subject};
use tether_transport::{ChannelTransport, RpcBackend};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Auth signal payload announcing a completed login.
const LOGIN_COMPLETE: &str = "login_complete";
/// Auth signal payload announcing a completed logout.
const LOGOUT_COMPLETE: &str = "logout_complete";

/// Handle to one realtime session.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a client with the default transports: HTTP RPC against
    /// `config.url_prefix` and a WebSocket realtime channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the per-namespace state file cannot be opened.
    #[cfg(feature = "websocket")]
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage: Arc<dyn Storage> =
            Arc::new(tether_core::FileStorage::open(config.storage_path())?);
        let backend: Arc<dyn RpcBackend> =
            Arc::new(tether_transport::HttpRpc::new(&config.url_prefix));
        let transport: Arc<dyn ChannelTransport> =
            Arc::new(tether_transport::WebSocketChannel::new());
        Ok(Self::with_parts(config, storage, transport, backend))
    }

    /// Create a client over explicit storage and transport implementations.
    #[must_use]
    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn ChannelTransport>,
        backend: Arc<dyn RpcBackend>,
    ) -> Self {
        Self {
            shared: Shared::new(config, storage, transport, backend),
        }
    }

    /// Go live: replay the durable outbox, flush commands queued before
    /// connect, and request the realtime channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox cannot be read.
    pub fn connect(&self) -> Result<(), ClientError> {
        if self.shared.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let queued = {
            let mut state = self.shared.state.lock().unwrap();
            if state.ready {
                return Ok(());
            }
            state.ready = true;
            std::mem::take(&mut state.queued)
        };

        // Sends issued before connect() sit in both the queue and the
        // outbox; the queue copy wins so its waiter resolves.
        let queued_sends: HashSet<String> = queued
            .iter()
            .filter_map(|pending| match &pending.command {
                Command::SendMessage {
                    sender_message_id, ..
                } => Some(sender_message_id.clone()),
                _ => None,
            })
            .collect();

        // Unacked sends from previous sessions go out first. They are
        // already persisted, so this bypasses enqueue.
        let mut batch: Vec<Pending> = self
            .shared
            .outbox
            .pending()?
            .into_iter()
            .filter(|entry| !queued_sends.contains(&entry.sender_message_id))
            .map(|entry| {
                info!(
                    subject = %entry.subject.name,
                    sender_message_id = %entry.sender_message_id,
                    "Replaying unacknowledged message"
                );
                Pending::fire_and_forget(Command::SendMessage {
                    subject: entry.subject,
                    message: entry.message,
                    sender_message_id: entry.sender_message_id,
                    key: entry.key,
                })
            })
            .collect();
        batch.extend(queued);
        rpc::submit_now(&self.shared, batch);

        session::ensure_channel(&self.shared);
        Ok(())
    }

    /// Subscribe to `subject` with no history.
    ///
    /// Resolves once the server acknowledges the subscription; by then any
    /// requested history has already been applied and announced. Subscribing
    /// to an already-subscribed subject resolves without a second request.
    ///
    /// # Errors
    ///
    /// [`ClientError::AccessDenied`] or another rejection mapped from the
    /// server's result; transient failures are retried internally.
    pub async fn subscribe(&self, subject: impl Into<Subject>) -> Result<(), ClientError> {
        self.subscribe_with(subject, 0, None, None).await
    }

    /// Subscribe with history: `messages` of 0 requests none, -1 all, and
    /// N > 0 the most recent N. `last_id` resumes from a cursor, delivering
    /// only messages with an id above it. `keys` requests the latest message
    /// per key.
    ///
    /// # Errors
    ///
    /// Same as [`Client::subscribe`].
    pub async fn subscribe_with(
        &self,
        subject: impl Into<Subject>,
        messages: i64,
        last_id: Option<MessageId>,
        keys: Option<Vec<String>>,
    ) -> Result<(), ClientError> {
        if self.shared.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let subject = subject.into();

        // Local subjects never touch the network.
        if subject.local {
            if self.shared.registry.insert_pending(subject.clone()) {
                self.shared.registry.activate(&subject);
            }
            return Ok(());
        }

        let canonical = subject.canonical_key();
        let is_new = self.shared.registry.insert_pending(subject.clone());
        if !is_new && self.shared.registry.state(&subject) == Some(SubscriptionState::Active) {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        self.shared
            .subscribe_waiters
            .entry(canonical.clone())
            .or_default()
            .push(tx);

        // Shutdown may have drained the waiter map between the entry check
        // and the registration above.
        if self.shared.is_shutdown() {
            self.shared.subscribe_waiters.remove(&canonical);
            return Err(ClientError::Shutdown);
        }

        if is_new {
            rpc::submit(
                &self.shared,
                Pending::fire_and_forget(Command::Subscribe {
                    subject: subject.clone(),
                    messages: if messages == 0 { None } else { Some(messages) },
                    last_id,
                    keys,
                }),
            );
        } else {
            // The ack (or a teardown) may have landed between the state
            // check and waiter registration; resolve everyone now.
            match self.shared.registry.state(&subject) {
                Some(SubscriptionState::Pending) => {}
                Some(SubscriptionState::Active) => {
                    if let Some((_, waiters)) = self.shared.subscribe_waiters.remove(&canonical) {
                        for waiter in waiters {
                            let _ = waiter.send(Ok(()));
                        }
                    }
                }
                None => {
                    if let Some((_, waiters)) = self.shared.subscribe_waiters.remove(&canonical) {
                        for waiter in waiters {
                            let _ = waiter.send(Err(ClientError::Unsubscribed));
                        }
                    }
                }
            }
        }

        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Tear down the subscription for `subject`.
    ///
    /// Local state is dropped immediately; in-flight subscribe waiters fail
    /// with [`ClientError::Unsubscribed`].
    ///
    /// # Errors
    ///
    /// A server rejection of the unsubscribe, or [`ClientError::Shutdown`].
    pub async fn unsubscribe(&self, subject: impl Into<Subject>) -> Result<(), ClientError> {
        let subject = subject.into();

        let removed = self.shared.registry.remove(&subject).is_some();
        if let Some((_, waiters)) = self
            .shared
            .subscribe_waiters
            .remove(&subject.canonical_key())
        {
            for waiter in waiters {
                let _ = waiter.send(Err(ClientError::Unsubscribed));
            }
        }

        if !removed || subject.local {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        rpc::submit(
            &self.shared,
            Pending {
                command: Command::Unsubscribe { subject },
                ack: Some(tx),
            },
        );
        rx.await.map_err(|_| ClientError::Shutdown)?.map(|_| ())
    }

    /// Publish `message` on `subject` with at-least-once delivery.
    ///
    /// The message is persisted to the outbox before any network attempt;
    /// if the process dies before the server acknowledges it, the next
    /// session replays it under the same idempotency token.
    ///
    /// # Errors
    ///
    /// [`ClientError::Storage`] if the message cannot be persisted (nothing
    /// is sent in that case), or a server rejection.
    pub async fn send_message(
        &self,
        subject: impl Into<Subject>,
        message: serde_json::Value,
    ) -> Result<Message, ClientError> {
        self.send(subject.into(), message, None).await
    }

    /// Publish with a latest-per-key key.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_message`].
    pub async fn send_message_keyed(
        &self,
        subject: impl Into<Subject>,
        message: serde_json::Value,
        key: impl Into<String>,
    ) -> Result<Message, ClientError> {
        self.send(subject.into(), message, Some(key.into())).await
    }

    async fn send(
        &self,
        subject: Subject,
        message: serde_json::Value,
        key: Option<String>,
    ) -> Result<Message, ClientError> {
        if self.shared.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let sender_message_id = uuid::Uuid::new_v4().to_string();

        if subject.local {
            let mut local = Message::local(subject.clone(), message)
                .with_sender_message_id(sender_message_id);
            if let Some(key) = key {
                local = local.with_key(key);
            }
            let stored = self
                .shared
                .registry
                .with_mut(&subject, |sub| sub.insert_message(local.clone()))
                .unwrap_or(false);
            if stored {
                self.shared.events.emit(ClientEvent::Message(local.clone()));
            } else {
                debug!(subject = %subject.name, "Local message on unsubscribed subject");
            }
            return Ok(local);
        }

        self.shared.outbox.enqueue(OutboxEntry {
            subject: subject.clone(),
            message: message.clone(),
            sender_message_id: sender_message_id.clone(),
            key: key.clone(),
        })?;

        let (tx, rx) = oneshot::channel();
        rpc::submit(
            &self.shared,
            Pending {
                command: Command::SendMessage {
                    subject: subject.clone(),
                    message: message.clone(),
                    sender_message_id: sender_message_id.clone(),
                    key: key.clone(),
                },
                ack: Some(tx),
            },
        );

        let response = rx.await.map_err(|_| ClientError::Shutdown)??;
        Ok(response.message.unwrap_or_else(|| {
            let mut echo =
                Message::local(subject, message).with_sender_message_id(sender_message_id);
            echo.key = key;
            echo
        }))
    }

    /// Pin `message` on `subject` as ephemeral presence state.
    ///
    /// Returns the pin id used to [`Client::unpin`] it later. The pin is
    /// tracked immediately and re-asserted after every reconnect until
    /// unpinned; it does not survive on the server across a disconnect.
    ///
    /// # Errors
    ///
    /// A server rejection, or [`ClientError::Shutdown`].
    pub async fn pin(
        &self,
        subject: impl Into<Subject>,
        message: serde_json::Value,
    ) -> Result<String, ClientError> {
        if self.shared.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let subject = subject.into();
        let sender_message_id = uuid::Uuid::new_v4().to_string();

        self.shared.held_pins.insert(
            sender_message_id.clone(),
            HeldPin {
                subject: subject.clone(),
                message: message.clone(),
                sender_message_id: sender_message_id.clone(),
                acked: false,
            },
        );

        if subject.local {
            let pin = Message::local(subject.clone(), message)
                .with_sender_message_id(sender_message_id.clone());
            let stored = self
                .shared
                .registry
                .with_mut(&subject, |sub| sub.insert_pin(pin.clone()))
                .unwrap_or(false);
            if stored {
                self.shared.events.emit(ClientEvent::Pin(pin));
            }
            return Ok(sender_message_id);
        }

        let (tx, rx) = oneshot::channel();
        rpc::submit(
            &self.shared,
            Pending {
                command: Command::Pin {
                    subject,
                    message,
                    sender_message_id: sender_message_id.clone(),
                },
                ack: Some(tx),
            },
        );

        rx.await.map_err(|_| ClientError::Shutdown)??;
        Ok(sender_message_id)
    }

    /// Remove a pin previously created by [`Client::pin`].
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownPin`] if this client holds no pin with that id.
    pub async fn unpin(&self, pin_id: &str) -> Result<(), ClientError> {
        let held = self
            .shared
            .held_pins
            .get(pin_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClientError::UnknownPin(pin_id.to_string()))?;

        if held.subject.local {
            let removed = self
                .shared
                .registry
                .with_mut(&held.subject, |sub| sub.remove_pin(Some(pin_id), None))
                .ok()
                .flatten();
            if let Some(pin) = removed {
                self.shared.events.emit(ClientEvent::Unpin {
                    subject: held.subject.clone(),
                    sender_message_id: pin.sender_message_id,
                    id: pin.id,
                });
            }
            self.shared.held_pins.remove(pin_id);
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        rpc::submit(
            &self.shared,
            Pending {
                command: Command::Unpin {
                    subject: held.subject,
                    sender_message_id: held.sender_message_id,
                },
                ack: Some(tx),
            },
        );
        rx.await.map_err(|_| ClientError::Shutdown)?.map(|_| ())
    }

    /// All stored messages for `subject`, ordered by id ascending.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSubscribed`] if there is no subscription.
    pub fn messages(&self, subject: impl Into<Subject>) -> Result<Vec<Message>, ClientError> {
        Ok(self
            .shared
            .registry
            .with(&subject.into(), |sub| sub.messages().to_vec())?)
    }

    /// The most recent stored message for `subject`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSubscribed`] if there is no subscription.
    pub fn last_message(
        &self,
        subject: impl Into<Subject>,
    ) -> Result<Option<Message>, ClientError> {
        Ok(self
            .shared
            .registry
            .with(&subject.into(), |sub| sub.last_message().cloned())?)
    }

    /// The latest stored message carrying `key` on `subject`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSubscribed`] if there is no subscription.
    pub fn key_message(
        &self,
        subject: impl Into<Subject>,
        key: &str,
    ) -> Result<Option<Message>, ClientError> {
        Ok(self
            .shared
            .registry
            .with(&subject.into(), |sub| sub.key_message(key).cloned())?)
    }

    /// Currently pinned messages on `subject`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSubscribed`] if there is no subscription.
    pub fn pins(&self, subject: impl Into<Subject>) -> Result<Vec<Message>, ClientError> {
        Ok(self
            .shared
            .registry
            .with(&subject.into(), |sub| sub.pins().to_vec())?)
    }

    /// The profile id assigned by the server, waiting for the first
    /// assignment if none has arrived yet.
    ///
    /// # Errors
    ///
    /// [`ClientError::Shutdown`] if the client shuts down first.
    pub async fn profile(&self) -> Result<String, ClientError> {
        let rx = {
            let mut slot = self.shared.profile.lock().unwrap();
            if let Some(profile) = &slot.current {
                return Ok(profile.clone());
            }
            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);
            rx
        };
        if self.shared.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// The profile id, if one has been assigned.
    #[must_use]
    pub fn current_profile(&self) -> Option<String> {
        self.shared.profile.lock().unwrap().current.clone()
    }

    /// Whether the realtime channel is currently open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared.channel_state() == ChannelState::Open
    }

    /// Register a listener for client events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// A fresh idempotency token, usable wherever a caller wants to
    /// correlate its own sends.
    #[must_use]
    pub fn uuid() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Handle a cross-instance auth signal (e.g. from a popup flow).
    ///
    /// Signals from an origin other than the configured `auth_origin` are
    /// dropped. A completed login or logout forces the channel closed; the
    /// reconnect re-binds the session under the new identity.
    pub fn handle_auth_signal(&self, origin: &str, data: &str) {
        match &self.shared.config.auth_origin {
            Some(expected) if expected == origin => {}
            _ => {
                warn!(origin, "Dropping auth signal from unexpected origin");
                return;
            }
        }

        match data {
            LOGIN_COMPLETE => {
                info!("Login complete; rebinding session");
                session::force_close(&self.shared);
            }
            LOGOUT_COMPLETE => {
                info!("Logout complete; clearing identity");
                self.shared.clear_identity();
                session::force_close(&self.shared);
            }
            other => debug!(data = other, "Ignoring unknown auth signal"),
        }
    }

    /// Shut the client down: close the channel, stop reconnects, fail
    /// outstanding waiters. Unacked sends stay in the outbox for the next
    /// session. Idempotent.
    pub fn shutdown(&self) {
        session::shutdown(&self.shared);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.shared.config.namespace)
            .field("channel", &self.shared.channel_state())
            .field("subscriptions", &self.shared.registry.len())
            .finish()
    }
}
