//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open client connections.
    pub connections: usize,
    /// Whether a game process is attached.
    pub game_session_active: bool,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, game_session_active: bool) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        game_session_active,
    }
}
