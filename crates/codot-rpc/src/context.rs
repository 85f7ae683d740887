//! Dependencies handed to every command handler.

use std::sync::Arc;
use std::time::Instant;

use codot_core::host::{EditorHost, NullHost};
use codot_core::ids::ConnectionId;
use codot_debugger::DebuggerBridge;
use codot_events::EventBus;
use tokio_util::sync::CancellationToken;

/// Shared handler context.
///
/// The composition root builds one instance; the transport derives a
/// per-connection copy with [`RpcContext::for_connection`]. Cloning is cheap.
#[derive(Clone)]
pub struct RpcContext {
    /// Event pub/sub.
    pub bus: Arc<EventBus>,
    /// Game-process session bridge.
    pub bridge: Arc<DebuggerBridge>,
    /// Editor capabilities.
    pub host: Arc<dyn EditorHost>,
    /// Fires on server shutdown; long-running handlers stop early.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub server_start_time: Instant,
    /// Connection the current request arrived on.
    pub connection_id: Option<ConnectionId>,
}

impl RpcContext {
    /// Build a root context with no connection.
    pub fn new(
        bus: Arc<EventBus>,
        bridge: Arc<DebuggerBridge>,
        host: Arc<dyn EditorHost>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bus,
            bridge,
            host,
            shutdown,
            server_start_time: Instant::now(),
            connection_id: None,
        }
    }

    /// Copy of this context bound to `connection_id`.
    #[must_use]
    pub fn for_connection(&self, connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            ..self.clone()
        }
    }
}

impl Default for RpcContext {
    fn default() -> Self {
        let bus = Arc::new(EventBus::default());
        Self::new(
            Arc::clone(&bus),
            Arc::new(DebuggerBridge::default().with_event_bus(bus)),
            Arc::new(NullHost),
            CancellationToken::new(),
        )
    }
}
