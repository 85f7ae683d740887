//! Live client connections, keyed by id.
//!
//! A socket is counted as pending from the HTTP upgrade request until the
//! WebSocket handshake completes, then promoted to an open
//! [`ClientConnection`]. Both count against the connection limit.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use codot_core::ids::{ConnectionId, IdGenerator};
use codot_events::{Event, EventBus, EventSink};
use codot_rpc::{EventNotification, RpcResponse};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, ConnectionState};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL, WS_SEND_DROPS_TOTAL};

/// Outcome of [`ConnectionRegistry::send_response`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// Queued for the client.
    Sent,
    /// No such connection; it disconnected before the response was ready.
    NotFound,
    /// The connection's outbound queue was full or closed.
    Dropped,
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the socket failed.
    SocketError,
    /// The client stopped answering pings.
    HeartbeatTimeout,
    /// The server is stopping.
    ServerShutdown,
}

impl DisconnectReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::SocketError => "socket_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback run after a connection is removed.
pub trait DisconnectHook: Send + Sync {
    /// `id` has been removed from the registry.
    fn on_disconnect(&self, id: ConnectionId, reason: DisconnectReason);
}

/// Drops event subscriptions owned by a disconnected connection.
pub struct ClearSubscriptions {
    bus: Arc<EventBus>,
}

impl ClearSubscriptions {
    /// Hook clearing subscriptions on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl DisconnectHook for ClearSubscriptions {
    fn on_disconnect(&self, id: ConnectionId, _reason: DisconnectReason) {
        let removed = self.bus.remove_owned_by(id);
        if removed > 0 {
            debug!(conn_id = %id, removed, "cleared subscriptions of disconnected client");
        }
    }
}

/// A reserved connection slot for a socket still in its handshake.
///
/// Dropping it without calling [`ConnectionRegistry::promote`] releases the
/// slot.
pub struct PendingConnection {
    pending: Arc<AtomicUsize>,
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        let _ = self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConnection").finish_non_exhaustive()
    }
}

/// Registry of open client connections.
pub struct ConnectionRegistry {
    ids: IdGenerator,
    max_connections: usize,
    pending: Arc<AtomicUsize>,
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    hooks: RwLock<Vec<Arc<dyn DisconnectHook>>>,
}

impl ConnectionRegistry {
    /// Create a registry admitting at most `max_connections` sockets.
    pub fn new(max_connections: usize) -> Self {
        Self {
            ids: IdGenerator::new(),
            max_connections,
            pending: Arc::new(AtomicUsize::new(0)),
            connections: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Install a disconnect hook.
    pub fn add_disconnect_hook(&self, hook: Arc<dyn DisconnectHook>) {
        self.hooks.write().push(hook);
    }

    /// Reserve a slot for a socket that is about to upgrade. `None` when
    /// the limit is reached.
    pub fn try_reserve(&self) -> Option<PendingConnection> {
        let open = self.connections.read().len();
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (open + pending < self.max_connections).then_some(pending + 1)
            })
            .is_ok();
        reserved.then(|| PendingConnection {
            pending: Arc::clone(&self.pending),
        })
    }

    /// Complete the handshake: assign the next id and register the open
    /// connection.
    pub fn promote(&self, slot: PendingConnection, tx: mpsc::Sender<String>) -> Arc<ClientConnection> {
        let id: ConnectionId = self.ids.next();
        let connection = Arc::new(ClientConnection::new(id, tx));
        connection.set_state(ConnectionState::Open);
        let _ = self.connections.write().insert(id, Arc::clone(&connection));
        drop(slot);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %id, "client connected");
        connection
    }

    /// Remove a connection and run disconnect hooks. Returns `false` when
    /// it was already gone.
    pub fn disconnect(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some(connection) = self.connections.write().remove(&id) else {
            return false;
        };
        connection.set_state(ConnectionState::Closed);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        info!(
            conn_id = %id,
            %reason,
            age_secs = connection.age().as_secs_f64(),
            dropped = connection.drop_count(),
            "client disconnected"
        );
        let hooks: Vec<Arc<dyn DisconnectHook>> = self.hooks.read().clone();
        for hook in hooks {
            hook.on_disconnect(id, reason);
        }
        true
    }

    /// Close every connection and clear the registry. Idempotent.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = {
            let conns = self.connections.read();
            for conn in conns.values() {
                conn.set_state(ConnectionState::Closing);
            }
            conns.keys().copied().collect()
        };
        ids.into_iter()
            .filter(|id| self.disconnect(*id, DisconnectReason::ServerShutdown))
            .count()
    }

    /// Look up an open connection.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Serialize `response` and queue it on connection `id`.
    pub fn send_response(&self, id: ConnectionId, response: &RpcResponse) -> SendStatus {
        let Some(connection) = self.get(id) else {
            debug!(conn_id = %id, "response for unknown connection discarded");
            return SendStatus::NotFound;
        };
        if connection.send_json(response) {
            SendStatus::Sent
        } else {
            counter!(WS_SEND_DROPS_TOTAL).increment(1);
            warn!(conn_id = %id, "failed to enqueue response (queue full or closed)");
            SendStatus::Dropped
        }
    }

    /// Open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Sockets still in their handshake.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Ids of open connections, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl EventSink for ConnectionRegistry {
    fn deliver(&self, connection: ConnectionId, event: &Event) -> bool {
        let Some(conn) = self.get(connection) else {
            return false;
        };
        let delivered = conn.send_json(&EventNotification::new(event));
        if !delivered {
            counter!(WS_SEND_DROPS_TOTAL).increment(1);
            debug!(conn_id = %connection, seq = event.seq, "event push dropped");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codot_events::{EventFilter, EventType, SubscribeOptions};
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<(ConnectionId, DisconnectReason)>>,
    }

    impl DisconnectHook for RecordingHook {
        fn on_disconnect(&self, id: ConnectionId, reason: DisconnectReason) {
            self.calls.lock().push((id, reason));
        }
    }

    fn open(reg: &ConnectionRegistry) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let slot = reg.try_reserve().unwrap();
        (reg.promote(slot, tx), rx)
    }

    #[test]
    fn promote_opens_and_disconnect_closes() {
        let reg = ConnectionRegistry::new(2);
        let (conn, _rx) = open(&reg);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(reg.disconnect(conn.id, DisconnectReason::ClientClosed));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = open(&reg);
        let (b, _rb) = open(&reg);
        assert!(reg.disconnect(a.id, DisconnectReason::ClientClosed));
        let (c, _rc) = open(&reg);
        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(reg.ids(), vec![b.id, c.id]);
    }

    #[test]
    fn pending_slots_count_against_limit() {
        let reg = ConnectionRegistry::new(2);
        let first = reg.try_reserve().unwrap();
        let _second = reg.try_reserve().unwrap();
        assert_eq!(reg.pending_count(), 2);
        assert!(reg.try_reserve().is_none());

        // a failed handshake releases its slot
        drop(first);
        assert_eq!(reg.pending_count(), 1);
        assert!(reg.try_reserve().is_some());
    }

    #[test]
    fn promote_moves_pending_to_open() {
        let reg = ConnectionRegistry::new(1);
        let (conn, _rx) = open(&reg);
        assert_eq!(reg.pending_count(), 0);
        assert_eq!(reg.connection_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(reg.try_reserve().is_none());
    }

    #[tokio::test]
    async fn send_response_statuses() {
        let reg = ConnectionRegistry::new(4);
        let (conn, mut rx) = open(&reg);
        let resp = RpcResponse::success(json!(7), json!({"ok": true}));
        assert_eq!(reg.send_response(conn.id, &resp), SendStatus::Sent);
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["id"], 7);

        assert_eq!(
            reg.send_response(ConnectionId::new(999), &resp),
            SendStatus::NotFound
        );

        drop(rx);
        assert_eq!(reg.send_response(conn.id, &resp), SendStatus::Dropped);
    }

    #[test]
    fn disconnect_runs_hooks_once() {
        let reg = ConnectionRegistry::new(4);
        let hook = Arc::new(RecordingHook::default());
        reg.add_disconnect_hook(hook.clone());
        let (conn, _rx) = open(&reg);
        assert!(reg.disconnect(conn.id, DisconnectReason::SocketError));
        assert!(!reg.disconnect(conn.id, DisconnectReason::SocketError));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            *hook.calls.lock(),
            vec![(conn.id, DisconnectReason::SocketError)]
        );
    }

    #[test]
    fn close_all_clears_registry() {
        let reg = ConnectionRegistry::new(4);
        let hook = Arc::new(RecordingHook::default());
        reg.add_disconnect_hook(hook.clone());
        let (_a, _ra) = open(&reg);
        let (_b, _rb) = open(&reg);
        assert_eq!(reg.close_all(), 2);
        assert_eq!(reg.connection_count(), 0);
        assert_eq!(reg.close_all(), 0);
        assert!(hook
            .calls
            .lock()
            .iter()
            .all(|(_, r)| *r == DisconnectReason::ServerShutdown));
    }

    #[tokio::test]
    async fn pushes_events_to_subscribed_connection() {
        let reg = Arc::new(ConnectionRegistry::new(4));
        let bus = EventBus::default();
        bus.set_sink(&reg);
        let (conn, mut rx) = open(&reg);
        let _ = bus
            .subscribe(
                "watcher",
                "scene_changed",
                EventFilter::default(),
                SubscribeOptions {
                    connection: Some(conn.id),
                    push: true,
                },
            )
            .unwrap();
        let _ = bus.publish(EventType::SceneChanged, json!({"path": "res://main.tscn"}));

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["event"]["type"], "scene_changed");
        assert_eq!(frame["event"]["data"]["path"], "res://main.tscn");
        // still pollable
        assert_eq!(bus.poll("watcher", 10, false).len(), 1);
    }

    #[test]
    fn clear_subscriptions_hook() {
        let reg = ConnectionRegistry::new(4);
        let bus = Arc::new(EventBus::default());
        reg.add_disconnect_hook(Arc::new(ClearSubscriptions::new(bus.clone())));
        let (conn, _rx) = open(&reg);
        let _ = bus
            .subscribe(
                &conn.id.to_string(),
                "node_added",
                EventFilter::default(),
                SubscribeOptions {
                    connection: Some(conn.id),
                    push: false,
                },
            )
            .unwrap();
        assert!(bus.has_client("conn_1"));
        let _ = reg.disconnect(conn.id, DisconnectReason::ClientClosed);
        assert!(!bus.has_client("conn_1"));
    }
}
