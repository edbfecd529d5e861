//! Per-connection outbound queue and liveness state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use danmaku_core::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A connected viewer.
#[derive(Debug)]
pub struct ClientConnection {
    /// Session this connection carries.
    pub id: SessionId,
    /// Send channel to the connection's write task.
    tx: mpsc::Sender<Utf8Bytes>,
    /// When this connection was established.
    connected_at: Instant,
    /// Whether the client has answered since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) was received.
    last_pong: Mutex<Instant>,
    /// Frames dropped because the queue was full or closed.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection writing into `tx`.
    pub fn new(id: SessionId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, frame: Utf8Bytes) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record activity from the client.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong or connection establishment.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Whether the client has been silent for longer than `timeout`.
    ///
    /// Consumes the alive flag like [`Self::check_alive`].
    pub fn is_unresponsive(&self, timeout: Duration) -> bool {
        !self.check_alive() && self.last_pong_elapsed() > timeout
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
