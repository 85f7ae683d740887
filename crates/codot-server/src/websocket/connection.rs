//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use codot_core::ids::ConnectionId;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// Lifecycle of a client connection.
///
/// A connection is built in `Connecting` and the registry moves it to
/// `Open` when it promotes the pending slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Accepting frames.
    Open,
    /// Shutting down; no new frames are read.
    Closing,
    /// Gone.
    Closed,
}

/// A connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection id.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<String>,
    state: Mutex<ConnectionState>,
    /// When the handshake completed.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    is_alive: AtomicBool,
    /// When the last pong (or any frame) was received.
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in `Connecting`. Sends are refused until it is
    /// moved to `Open`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            state: Mutex::new(ConnectionState::Connecting),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `state`.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Queue a text frame for the client.
    ///
    /// Returns `false` if the connection is not open or its queue is full or
    /// closed, and increments the dropped message counter.
    pub fn send(&self, message: String) -> bool {
        if self.state() == ConnectionState::Open && self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize `value` and queue it.
    pub fn send_json(&self, value: &impl Serialize) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
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

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
