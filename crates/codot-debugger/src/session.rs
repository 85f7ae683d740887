//! Debugger sessions with the game process.

use std::sync::Arc;

use codot_core::ids::SessionId;
use serde::Serialize;

use crate::messages::GameMessage;

/// Outbound half of a game-process connection.
///
/// Implemented by the transport. `send` must not block; `false` means the
/// channel is closed or full.
pub trait SessionChannel: Send + Sync {
    /// Queue `message` for the game process.
    fn send(&self, message: GameMessage) -> bool;
}

pub(crate) struct DebuggerSession {
    pub(crate) id: SessionId,
    pub(crate) active: bool,
    pub(crate) started_at: f64,
    pub(crate) last_seen: f64,
    pub(crate) channel: Option<Arc<dyn SessionChannel>>,
}

impl DebuggerSession {
    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            active: self.active,
            started_at: self.started_at,
            last_seen: self.last_seen,
        }
    }
}

/// Read view of a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: SessionId,
    /// Whether the game process is still connected.
    pub active: bool,
    /// Unix seconds at registration.
    pub started_at: f64,
    /// Unix seconds of the last inbound message.
    pub last_seen: f64,
}
