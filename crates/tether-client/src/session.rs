//! Channel session state machine and shared client state.
//!
//! One `Shared` per client instance holds everything: registry, outbox,
//! transports, and the session state. There are no process-wide singletons;
//! the storage namespace is an explicit dependency.

use crate::config::ClientConfig;
use crate::dispatcher;
use crate::error::ClientError;
use crate::rpc::{self, Pending};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{ClientEvent, EventBus, Outbox, Registry, Storage};
use tether_protocol::{Command, Envelope, Subject};
use tether_transport::{backoff, Backoff, ChannelSignal, ChannelTransport, RpcBackend};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Channel session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No channel, none requested.
    Closed,
    /// `createChannel` RPC in flight.
    Pending,
    /// Token received, waiting for the socket-opened signal.
    Opening,
    /// Socket open; traffic flows.
    Open,
}

/// A pin held by this client, re-asserted after every reconnect.
#[derive(Debug, Clone)]
pub(crate) struct HeldPin {
    pub subject: Subject,
    pub message: serde_json::Value,
    pub sender_message_id: String,
    /// Whether the server has acked this pin. Only acked pins are
    /// re-asserted on channel open; an unacked one still has its original
    /// RPC in flight.
    pub acked: bool,
}

/// Profile assignment and its waiters.
#[derive(Debug, Default)]
pub(crate) struct ProfileSlot {
    pub current: Option<String>,
    pub waiters: Vec<oneshot::Sender<String>>,
}

/// Mutable session state, guarded by one lock.
pub(crate) struct SessionState {
    pub channel: ChannelState,
    /// Facade is Ready (connect() called).
    pub ready: bool,
    /// Commands queued while the session is not Open and no identity exists.
    pub queued: Vec<Pending>,
    /// Signal to force-close the live channel task, if one is running.
    pub force_close: Option<mpsc::UnboundedSender<()>>,
}

/// Everything owned by one client instance.
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub instance_id: String,
    pub storage: Arc<dyn Storage>,
    pub registry: Registry,
    pub outbox: Outbox,
    pub events: EventBus,
    pub backend: Arc<dyn RpcBackend>,
    pub transport: Arc<dyn ChannelTransport>,
    pub state: Mutex<SessionState>,
    pub profile: Mutex<ProfileSlot>,
    /// Pins asserted by this client, keyed by sender message id.
    pub held_pins: DashMap<String, HeldPin>,
    /// Waiters per canonical subject for an in-flight subscribe attempt.
    pub subscribe_waiters: DashMap<String, Vec<oneshot::Sender<Result<(), ClientError>>>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn ChannelTransport>,
        backend: Arc<dyn RpcBackend>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let outbox = Outbox::new(Arc::clone(&storage), &config.namespace);
        let events = EventBus::with_capacity(config.event_capacity);
        Arc::new(Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            storage,
            registry: Registry::new(),
            outbox,
            events,
            backend,
            transport,
            state: Mutex::new(SessionState {
                channel: ChannelState::Closed,
                ready: false,
                queued: Vec::new(),
                force_close: None,
            }),
            profile: Mutex::new(ProfileSlot::default()),
            held_pins: DashMap::new(),
            subscribe_waiters: DashMap::new(),
            shutdown,
            config,
        })
    }

    /// Whether `shutdown()` has been called.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.subscribe().borrow()
    }

    /// A receiver that resolves when shutdown begins.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn storage_key(&self, suffix: &str) -> String {
        format!("{}:{}", self.config.namespace, suffix)
    }

    /// Stored client identity token, if any.
    pub fn client_id(&self) -> Option<String> {
        self.storage
            .get(&self.storage_key("client_id"))
            .unwrap_or_default()
    }

    /// Stored user-association token, if any.
    pub fn google_user_id(&self) -> Option<String> {
        self.storage
            .get(&self.storage_key("google_user_id"))
            .unwrap_or_default()
    }

    /// Build an RPC envelope around `commands`.
    pub fn build_envelope(&self, commands: Vec<Command>) -> Envelope {
        Envelope {
            instance_id: self.instance_id.clone(),
            client_id: self.client_id(),
            google_user_id: self.google_user_id(),
            commands,
        }
    }

    /// Persist identity tokens returned on a response envelope.
    pub fn store_identity(&self, client_id: Option<&str>, google_user_id: Option<&str>) {
        if let Some(id) = client_id {
            if let Err(e) = self.storage.set(&self.storage_key("client_id"), id) {
                warn!(error = %e, "Failed to persist client id");
            }
        }
        if let Some(id) = google_user_id {
            if let Err(e) = self.storage.set(&self.storage_key("google_user_id"), id) {
                warn!(error = %e, "Failed to persist user id");
            }
        }
    }

    /// Drop stored identity (logout).
    pub fn clear_identity(&self) {
        for suffix in ["client_id", "google_user_id"] {
            if let Err(e) = self.storage.remove(&self.storage_key(suffix)) {
                warn!(error = %e, "Failed to clear identity token");
            }
        }
    }

    /// Record the profile assignment and resolve pending waiters.
    ///
    /// A later, differing value updates the slot and notifies waiters that
    /// registered since; already-resolved waiters are not re-notified.
    pub fn set_profile(&self, profile: &str) {
        let mut slot = self.profile.lock().unwrap();
        if slot.current.as_deref() == Some(profile) {
            return;
        }
        slot.current = Some(profile.to_string());
        for waiter in slot.waiters.drain(..) {
            let _ = waiter.send(profile.to_string());
        }
    }

    /// Current channel session state.
    pub fn channel_state(&self) -> ChannelState {
        self.state.lock().unwrap().channel
    }
}

/// Start channel creation if the session is Closed, Ready and live.
///
/// A second call while non-Closed is a no-op.
pub(crate) fn ensure_channel(shared: &Arc<Shared>) {
    if shared.is_shutdown() {
        return;
    }
    {
        let mut state = shared.state.lock().unwrap();
        if !state.ready || state.channel != ChannelState::Closed {
            return;
        }
        state.channel = ChannelState::Pending;
    }
    info!("Requesting realtime channel");
    rpc::submit_now(
        shared,
        vec![Pending {
            command: Command::CreateChannel,
            ack: None,
        }],
    );
}

/// Flush commands queued while the session was unbound (no identity, no
/// open channel). No-op before `connect()`.
pub(crate) fn flush_queued(shared: &Arc<Shared>) {
    let queued = {
        let mut state = shared.state.lock().unwrap();
        if !state.ready {
            return;
        }
        std::mem::take(&mut state.queued)
    };
    rpc::submit_now(shared, queued);
}

/// A channel request did not produce a usable token; give up the Pending
/// state and try again after the base backoff delay.
pub(crate) fn channel_request_failed(shared: &Arc<Shared>) {
    {
        let mut state = shared.state.lock().unwrap();
        if state.channel != ChannelState::Pending {
            return;
        }
        state.channel = ChannelState::Closed;
    }
    if shared.is_shutdown() {
        return;
    }
    warn!("Channel request failed; retrying");
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let delay = Backoff::staggered(Duration::from_secs_f64(backoff::MIN_DELAY_SECS));
        let mut shutdown_rx = shared.shutdown_rx();
        tokio::select! {
            _ = tokio::time::sleep(delay) => ensure_channel(&shared),
            _ = shutdown_rx.changed() => {}
        }
    });
}

/// `createChannel` acked: open the transport with the server token.
pub(crate) fn on_channel_created(shared: &Arc<Shared>, token: String) {
    if shared.is_shutdown() {
        return;
    }
    {
        let mut state = shared.state.lock().unwrap();
        if state.channel != ChannelState::Pending {
            debug!(state = ?state.channel, "Ignoring channel token in unexpected state");
            return;
        }
        state.channel = ChannelState::Opening;
    }

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        run_channel(shared, token).await;
    });
}

/// Drive one channel from open to close, then reconnect.
async fn run_channel(shared: Arc<Shared>, token: String) {
    let mut handle = match shared.transport.open(&token).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Channel open failed");
            on_channel_closed(&shared);
            return;
        }
    };

    let (force_tx, mut force_rx) = mpsc::unbounded_channel();
    shared.state.lock().unwrap().force_close = Some(force_tx);

    let mut shutdown_rx = shared.shutdown_rx();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                handle.close().await;
                return;
            }
            _ = force_rx.recv() => {
                debug!("Channel force-closed");
                handle.close().await;
                break;
            }
            signal = handle.next() => match signal {
                Some(ChannelSignal::Open) => on_channel_open(&shared),
                Some(ChannelSignal::Message(data)) => {
                    match serde_json::from_str::<serde_json::Value>(&data) {
                        Ok(raw) => dispatcher::dispatch(&shared, &raw),
                        Err(e) => warn!(error = %e, "Undecodable channel payload"),
                    }
                }
                Some(ChannelSignal::Error { description, code }) => {
                    warn!(description, ?code, "Channel error");
                    handle.close().await;
                    break;
                }
                Some(ChannelSignal::Closed) | None => break,
            }
        }
    }

    on_channel_closed(&shared);
}

/// Socket opened: flush the queue, resubscribe, re-assert pins.
fn on_channel_open(shared: &Arc<Shared>) {
    if shared.is_shutdown() {
        return;
    }
    let queued = {
        let mut state = shared.state.lock().unwrap();
        if state.channel == ChannelState::Open {
            return;
        }
        state.channel = ChannelState::Open;
        std::mem::take(&mut state.queued)
    };
    info!("Channel open");

    let mut batch = queued;

    // Resume every active subscription from its last seen id.
    for (subject, last_id) in shared.registry.resume_points() {
        batch.push(Pending {
            command: Command::Subscribe {
                subject,
                messages: None,
                last_id,
                keys: None,
            },
            ack: None,
        });
    }

    // Pins do not survive a disconnect; re-assert what we hold. An unacked
    // pin is skipped: its original RPC is still in flight and will land on
    // this session.
    for pin in shared.held_pins.iter() {
        if pin.subject.local || !pin.acked {
            continue;
        }
        batch.push(Pending {
            command: Command::Pin {
                subject: pin.subject.clone(),
                message: pin.message.clone(),
                sender_message_id: pin.sender_message_id.clone(),
            },
            ack: None,
        });
    }

    if !batch.is_empty() {
        rpc::submit_now(shared, batch);
    }

    shared.events.emit(ClientEvent::Connect);
}

/// Socket closed: synthesize unpins, then reconnect unless shut down.
fn on_channel_closed(shared: &Arc<Shared>) {
    {
        let mut state = shared.state.lock().unwrap();
        state.channel = ChannelState::Closed;
        state.force_close = None;
    }
    if shared.is_shutdown() {
        return;
    }
    info!("Channel closed");

    // Pins are defined to not survive a disconnect: every tracked pin is
    // unpinned locally before the reconnect sequence begins.
    for pin in shared.registry.take_all_pins() {
        shared.events.emit(ClientEvent::Unpin {
            subject: pin.subject.clone(),
            sender_message_id: pin.sender_message_id.clone(),
            id: pin.id,
        });
    }

    shared.events.emit(ClientEvent::Disconnect);
    ensure_channel(shared);
}

/// Force the live channel (if any) to close.
pub(crate) fn force_close(shared: &Shared) {
    let state = shared.state.lock().unwrap();
    if let Some(tx) = &state.force_close {
        let _ = tx.send(());
    }
}

/// Terminal shutdown: stop retries and reconnects, close the channel, and
/// fail every outstanding waiter.
pub(crate) fn shutdown(shared: &Arc<Shared>) {
    if shared.shutdown.send_replace(true) {
        return; // Already shut down
    }
    info!("Client shutdown");
    let queued = {
        let mut state = shared.state.lock().unwrap();
        if let Some(tx) = &state.force_close {
            let _ = tx.send(());
        }
        state.force_close = None;
        std::mem::take(&mut state.queued)
    };
    rpc::abort_batch(shared, queued, || ClientError::Shutdown);

    // Waiters parked outside any batch resolve as shut down when their
    // senders drop.
    shared.subscribe_waiters.clear();
    shared.profile.lock().unwrap().waiters.clear();
}
