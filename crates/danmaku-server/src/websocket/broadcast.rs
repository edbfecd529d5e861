//! Connection registry and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use danmaku_core::{Multicast, ServerEvent, SessionId};
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Registry of live connections, used by the relay to deliver events.
///
/// Delivery never waits on a client: each frame is pushed with `try_send`
/// and dropped (and counted) if that client's queue is full.
pub struct BroadcastManager {
    connections: RwLock<HashMap<SessionId, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Unregister a connection.
    pub fn remove(&self, id: &SessionId) {
        let _ = self.connections.write().remove(id);
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Look up a connection.
    pub fn get(&self, id: &SessionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    fn deliver(conn: &ClientConnection, frame: Utf8Bytes, event_type: &str) -> bool {
        if conn.send(frame) {
            return true;
        }
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        warn!(
            session_id = %conn.id,
            event_type,
            dropped = conn.drop_count(),
            "outbound queue full or closed, event dropped"
        );
        false
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Multicast for BroadcastManager {
    fn send_to(&self, session_id: &SessionId, event: &ServerEvent) -> bool {
        let Some(conn) = self.get(session_id) else {
            debug!(%session_id, event_type = event.event_type(), "send to unknown session");
            return false;
        };
        Self::deliver(&conn, Utf8Bytes::from(event.to_json()), event.event_type())
    }

    fn broadcast(&self, event: &ServerEvent) -> usize {
        let frame = Utf8Bytes::from(event.to_json());
        let event_type = event.event_type();
        let conns = self.connections.read();
        let delivered = conns
            .values()
            .filter(|conn| Self::deliver(conn, frame.clone(), event_type))
            .count();
        debug!(event_type, recipients = conns.len(), delivered, "broadcast event to all");
        delivered
    }
}
