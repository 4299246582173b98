//! RPC driver.
//!
//! One task per batch. The driver owns the full retry lifecycle: network
//! failures retry the whole batch with backoff, a batch-level `retry` status
//! resubmits immediately discarding backoff, and per-command `retry` results
//! resubmit only the affected commands. Inline events on a response are
//! dispatched before any command's waiter is resolved, so by the time a
//! `subscribe` future completes its history is already visible.

use crate::dispatcher;
use crate::error::ClientError;
use crate::session::{self, ChannelState, Shared};
use std::sync::Arc;
use tether_protocol::{Command, CommandResponse, CommandResult, Status};
use tether_transport::Backoff;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A command awaiting server acknowledgement.
pub(crate) struct Pending {
    pub command: Command,
    /// Resolved once the command is acked or rejected. Fire-and-forget
    /// commands (reconnect resubscribes, re-pins) carry no waiter.
    pub ack: Option<oneshot::Sender<Result<CommandResponse, ClientError>>>,
}

impl Pending {
    pub fn fire_and_forget(command: Command) -> Self {
        Self { command, ack: None }
    }
}

/// Queue a command, or start a batch for it immediately.
///
/// Commands queue until the client is ready, and also while it has neither
/// a stored identity nor an open channel: the first batch through creates
/// the identity, and concurrent identity-less batches would each mint
/// their own. The queue flushes when an identity lands or the channel
/// opens.
pub(crate) fn submit(shared: &Arc<Shared>, pending: Pending) {
    if shared.is_shutdown() {
        fail(pending, ClientError::Shutdown);
        return;
    }
    {
        let mut state = shared.state.lock().unwrap();
        let gated = !state.ready
            || (state.channel != ChannelState::Open && shared.client_id().is_none());
        if gated {
            debug!(command = pending.command.name(), "Queued until session is bound");
            state.queued.push(pending);
            return;
        }
    }
    submit_now(shared, vec![pending]);
}

/// Start a driver task for `batch`.
pub(crate) fn submit_now(shared: &Arc<Shared>, batch: Vec<Pending>) {
    if batch.is_empty() {
        return;
    }
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        run_batch(shared, batch).await;
    });
}

/// Drive one batch to completion.
async fn run_batch(shared: Arc<Shared>, mut batch: Vec<Pending>) {
    let mut backoff = Backoff::new();
    let mut shutdown_rx = shared.shutdown_rx();

    loop {
        if shared.is_shutdown() {
            abort_batch(&shared, batch, || ClientError::Shutdown);
            return;
        }

        let commands: Vec<Command> = batch.iter().map(|p| p.command.clone()).collect();
        let envelope = shared.build_envelope(commands);
        debug!(commands = envelope.commands.len(), "RPC batch submit");

        let response = match shared.backend.execute(&envelope).await {
            Ok(response) => response,
            Err(e) => {
                let delay = Backoff::staggered(backoff.next_delay(e.retry_after()));
                warn!(error = %e, delay = ?delay, "RPC failed; backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = shutdown_rx.changed() => {
                        abort_batch(&shared, batch, || ClientError::Shutdown);
                        return;
                    }
                }
            }
        };

        shared.store_identity(
            response.client_id.as_deref(),
            response.google_user_id.as_deref(),
        );
        if response.client_id.is_some() {
            // Identity is bound; anything gated on it can go out now.
            session::flush_queued(&shared);
        }
        if let Some(profile) = &response.profile {
            shared.set_profile(profile);
        }

        match &response.status {
            // A batch-level retry discards accumulated backoff.
            Status::Retry => {
                debug!("Server requested batch retry");
                backoff.reset();
                continue;
            }
            Status::Other(status) => {
                warn!(status, "Batch failed with unrecognized status");
                let status = status.clone();
                abort_batch(&shared, batch, || ClientError::Server(status.clone()));
                return;
            }
            Status::Ok => {}
        }

        // Events first, then command completions.
        for raw in &response.events {
            dispatcher::dispatch(&shared, raw);
        }

        let mut to_retry = Vec::new();
        for (index, pending) in batch.into_iter().enumerate() {
            match response.responses.get(index) {
                // Missing positional response: treat as retryable.
                None => {
                    warn!(
                        command = pending.command.name(),
                        index, "No response for command; retrying"
                    );
                    to_retry.push(pending);
                }
                Some(resp) if resp.result == CommandResult::Retry => {
                    to_retry.push(pending);
                }
                Some(resp) if resp.result.is_ack() => complete_ok(&shared, pending, resp),
                Some(resp) => complete_err(&shared, pending, resp.result.clone()),
            }
        }

        if to_retry.is_empty() {
            return;
        }
        batch = to_retry;
        let delay = Backoff::staggered(backoff.next_delay(None));
        info!(commands = batch.len(), delay = ?delay, "Retrying commands after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                abort_batch(&shared, batch, || ClientError::Shutdown);
                return;
            }
        }
    }
}

/// Apply the side effects of an acknowledged command.
fn complete_ok(shared: &Arc<Shared>, pending: Pending, resp: &CommandResponse) {
    match &pending.command {
        Command::CreateChannel => match &resp.token {
            Some(token) => session::on_channel_created(shared, token.clone()),
            None => {
                warn!("createChannel acked without a token");
                session::channel_request_failed(shared);
            }
        },
        Command::Subscribe { subject, .. } => {
            shared.registry.activate(subject);
            resolve_subscribe_waiters(shared, &subject.canonical_key(), None);
        }
        Command::SendMessage {
            sender_message_id, ..
        } => {
            match shared.outbox.ack(sender_message_id) {
                Ok(true) => {}
                Ok(false) => debug!(sender_message_id, "Ack for message not in outbox"),
                Err(e) => warn!(error = %e, "Failed to persist outbox ack"),
            }
        }
        Command::Pin {
            sender_message_id, ..
        } => {
            // Acked pins become eligible for re-assertion on reconnect.
            if let Some(mut held) = shared.held_pins.get_mut(sender_message_id) {
                held.acked = true;
            }
        }
        Command::Unpin {
            sender_message_id, ..
        } => {
            shared.held_pins.remove(sender_message_id);
        }
        Command::Unsubscribe { .. } => {}
    }

    if let Some(ack) = pending.ack {
        let _ = ack.send(Ok(resp.clone()));
    }
}

/// Apply the side effects of a rejected command.
fn complete_err(shared: &Arc<Shared>, pending: Pending, result: CommandResult) {
    warn!(
        command = pending.command.name(),
        result = ?result,
        "Command rejected"
    );
    match &pending.command {
        // A refused channel request must not leave the session wedged in
        // Pending; release it so the request can be retried.
        Command::CreateChannel => session::channel_request_failed(shared),
        Command::Subscribe { subject, .. } => {
            shared.registry.remove(subject);
            resolve_subscribe_waiters(shared, &subject.canonical_key(), Some(result.clone()));
        }
        Command::Pin {
            sender_message_id, ..
        } => {
            shared.held_pins.remove(sender_message_id);
        }
        // A rejected publish will never be accepted; drop it from the
        // outbox so it is not replayed forever.
        Command::SendMessage {
            sender_message_id, ..
        } => {
            if let Err(e) = shared.outbox.ack(sender_message_id) {
                warn!(error = %e, "Failed to drop rejected message from outbox");
            }
        }
        _ => {}
    }

    if let Some(ack) = pending.ack {
        let _ = ack.send(Err(ClientError::rejection(result)));
    }
}

/// Resolve every waiter for a subscribe attempt. `rejection` of `None`
/// means success.
fn resolve_subscribe_waiters(shared: &Shared, canonical: &str, rejection: Option<CommandResult>) {
    if let Some((_, waiters)) = shared.subscribe_waiters.remove(canonical) {
        for waiter in waiters {
            let outcome = match &rejection {
                None => Ok(()),
                Some(result) => Err(ClientError::rejection(result.clone())),
            };
            let _ = waiter.send(outcome);
        }
    }
}

fn fail(pending: Pending, error: ClientError) {
    if let Some(ack) = pending.ack {
        let _ = ack.send(Err(error));
    }
}

/// Fail a whole batch terminally, unwinding the per-command state each
/// command set up before submission. Fire-and-forget subscribes resolve
/// their parked waiters here; nothing else holds a handle to them.
pub(crate) fn abort_batch(
    shared: &Arc<Shared>,
    batch: Vec<Pending>,
    mut error: impl FnMut() -> ClientError,
) {
    for pending in batch {
        match &pending.command {
            Command::CreateChannel => session::channel_request_failed(shared),
            Command::Subscribe { subject, .. } => {
                shared.registry.remove(subject);
                if let Some((_, waiters)) = shared.subscribe_waiters.remove(&subject.canonical_key())
                {
                    for waiter in waiters {
                        let _ = waiter.send(Err(error()));
                    }
                }
            }
            Command::Pin {
                sender_message_id, ..
            } => {
                shared.held_pins.remove(sender_message_id);
            }
            _ => {}
        }
        fail(pending, error());
    }
}
