//! WebSocket session lifecycle: one connected viewer from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use danmaku_core::{ClientEvent, SessionId};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastManager;
use super::connection::ClientConnection;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::RelayHandle;

/// How long a shutting-down session waits for its close frame to go out.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-session tuning taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which the client is dropped.
    pub pong_timeout: Duration,
    /// Outbound queue length.
    pub queue_capacity: usize,
}

/// What to do with one inbound frame.
#[derive(Debug)]
enum Inbound {
    Event(ClientEvent),
    Skip,
    Close,
}

/// Run a WebSocket session for a connected viewer.
///
/// 1. Hands the connection to the relay, which registers it for fan-out and
///    queues a `state` snapshot as its first frame
/// 2. Forwards decoded text and binary frames to the relay in arrival order
/// 3. Drains the outbound queue and sends periodic Ping frames
/// 4. Cleans up on close, error, heartbeat timeout or shutdown
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    session_id: SessionId,
    relay: RelayHandle,
    broadcast: Arc<BroadcastManager>,
    limits: SessionLimits,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Utf8Bytes>(limits.queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(session_id.clone(), send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound_conn = connection.clone();
    let outbound_cancel = cancel.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(limits.ping_interval);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if outbound_conn.is_unresponsive(limits.pong_timeout) {
                        warn!(
                            timeout = ?limits.pong_timeout,
                            "client unresponsive, disconnecting"
                        );
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut outbound_done = false;
    if relay.connect(connection.clone()).await.is_ok() {
        loop {
            let msg = tokio::select! {
                msg = ws_rx.next() => msg,
                _ = &mut outbound => {
                    outbound_done = true;
                    break;
                }
                () = cancel.cancelled() => break,
            };
            let Some(Ok(msg)) = msg else { break };

            match classify(msg, &connection) {
                Inbound::Event(event) => {
                    if relay.event(session_id.clone(), event).await.is_err() {
                        warn!("relay stopped, closing session");
                        break;
                    }
                }
                Inbound::Skip => {}
                Inbound::Close => {
                    info!("client sent close frame");
                    break;
                }
            }
        }
    } else {
        warn!("relay stopped, rejecting session");
    }

    if cancel.is_cancelled() && !outbound_done {
        // let the forwarder send its close frame
        let _ = tokio::time::timeout(CLOSE_GRACE, &mut outbound).await;
    }

    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    outbound.abort();
    // the relay normally does this on disconnect; it may already be gone
    broadcast.remove(&session_id);
    let _ = relay.disconnect(session_id).await;
}

/// Decode a frame. Any inbound frame counts as a sign of life.
#[instrument(level = "trace", skip_all, fields(session_id = %connection.id))]
fn classify(msg: Message, connection: &ClientConnection) -> Inbound {
    connection.mark_alive();
    let decoded = match msg {
        Message::Text(text) => ClientEvent::decode(text.as_str()),
        Message::Binary(data) => ClientEvent::decode_bytes(&data),
        Message::Ping(_) | Message::Pong(_) => return Inbound::Skip,
        Message::Close(_) => return Inbound::Close,
    };
    match decoded {
        Ok(event) => Inbound::Event(event),
        Err(err) => {
            debug!(error = %err, "dropping malformed frame");
            Inbound::Skip
        }
    }
}
