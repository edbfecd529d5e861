//! The task that owns the relay state.
//!
//! Every connection talks to the [`Relay`] through a cloneable
//! [`RelayHandle`]. Commands travel over one bounded channel and are applied
//! one at a time, so lane assignment, settings updates and admin checks all
//! happen in the order they were received.

use std::collections::HashMap;
use std::sync::Arc;

use danmaku_core::{
    ClientEvent, DropReason, Outcome, Relay, RelayError, Session, SessionId, Snapshot,
};
use metrics::counter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{
    ADMIN_LOGIN_ATTEMPTS_TOTAL, DANMAKU_ACCEPTED_TOTAL, DANMAKU_BANNED_TOTAL,
    STATE_BROADCASTS_TOTAL,
};
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::connection::ClientConnection;

/// Commands accepted by the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    /// A connection opened. It joins the registry, gets a snapshot, and
    /// from then on receives every broadcast.
    Connect(Arc<ClientConnection>),
    /// A decoded client event.
    Event(SessionId, ClientEvent),
    /// A connection closed. It leaves the registry and its session is dropped.
    Disconnect(SessionId),
    /// Read the current snapshot.
    Snapshot(oneshot::Sender<Snapshot>),
}

/// Cloneable sender side of the relay task.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Register a new connection.
    pub async fn connect(&self, connection: Arc<ClientConnection>) -> Result<(), RelayError> {
        self.send(RelayCommand::Connect(connection)).await
    }

    /// Forward an event from `id`.
    pub async fn event(&self, id: SessionId, event: ClientEvent) -> Result<(), RelayError> {
        self.send(RelayCommand::Event(id, event)).await
    }

    /// Drop the session for `id`.
    pub async fn disconnect(&self, id: SessionId) -> Result<(), RelayError> {
        self.send(RelayCommand::Disconnect(id)).await
    }

    /// Current settings and blocklist.
    pub async fn snapshot(&self) -> Result<Snapshot, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| RelayError::Closed)
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx.send(command).await.map_err(|_| RelayError::Closed)
    }
}

/// Spawn the relay task.
///
/// The task is the only writer of `registry`, so a connection's snapshot is
/// always the first frame queued for it. It stops when `cancel` fires or
/// every [`RelayHandle`] is dropped.
pub fn spawn_relay(
    relay: Relay,
    registry: Arc<BroadcastManager>,
    capacity: usize,
    cancel: CancellationToken,
) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let actor = RelayActor {
        relay,
        sessions: HashMap::new(),
        registry,
    };
    let handle = tokio::spawn(actor.run(rx, cancel));
    (RelayHandle { tx }, handle)
}

struct RelayActor {
    relay: Relay,
    sessions: HashMap<SessionId, Session>,
    registry: Arc<BroadcastManager>,
}

impl RelayActor {
    async fn run(mut self, mut rx: mpsc::Receiver<RelayCommand>, cancel: CancellationToken) {
        if !self.relay.gate().is_enabled() {
            warn!("no admin password configured, admin login is disabled");
        }
        info!("relay started");
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                () = cancel.cancelled() => break,
            }
        }
        info!(sessions = self.sessions.len(), "relay stopped");
    }

    fn apply(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Connect(connection) => {
                let id = connection.id.clone();
                let session = Session::new(id.clone());
                self.registry.add(connection);
                self.relay.on_connect(&session, self.registry.as_ref());
                let _ = self.sessions.insert(id, session);
            }
            RelayCommand::Event(id, event) => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    debug!(session_id = %id, "event for unknown session, ignoring");
                    return;
                };
                let event_type = event.event_type();
                let outcome = self.relay.handle(session, event, self.registry.as_ref());
                debug!(session_id = %id, event_type, ?outcome, "event handled");
                record_outcome(outcome);
            }
            RelayCommand::Disconnect(id) => {
                self.registry.remove(&id);
                if let Some(session) = self.sessions.remove(&id) {
                    self.relay.on_disconnect(&session);
                }
            }
            RelayCommand::Snapshot(reply) => {
                let _ = reply.send(self.relay.snapshot());
            }
        }
    }
}

fn record_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Delivered { .. } => counter!(DANMAKU_ACCEPTED_TOTAL).increment(1),
        Outcome::Banned => counter!(DANMAKU_BANNED_TOTAL).increment(1),
        Outcome::LoginGranted => {
            counter!(ADMIN_LOGIN_ATTEMPTS_TOTAL, "result" => "granted").increment(1);
        }
        Outcome::LoginDenied => {
            counter!(ADMIN_LOGIN_ATTEMPTS_TOTAL, "result" => "denied").increment(1);
        }
        Outcome::StateChanged => counter!(STATE_BROADCASTS_TOTAL).increment(1),
        Outcome::Dropped(DropReason::Unauthorized) => {
            warn!("privileged event from non-admin session dropped");
        }
        Outcome::Dropped(_) => {}
    }
}
