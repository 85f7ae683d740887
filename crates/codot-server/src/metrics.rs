//! Metric names recorded by the transport.
//!
//! Only the `metrics` facade is used; installing an exporter is left to the
//! embedding process.

/// Client connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Client disconnections (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open client connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Client connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Incoming frames that were not valid JSON (counter).
pub const WS_MALFORMED_FRAMES_TOTAL: &str = "ws_malformed_frames_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Game-process sessions started (counter).
pub const GAME_SESSIONS_TOTAL: &str = "game_sessions_total";
