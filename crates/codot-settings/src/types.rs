//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a partial file only needs the keys it changes.

use codot_core::logging::LogLevel;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for a Codot server instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodotSettings {
    /// Network and connection limits.
    pub server: ServerSettings,
    /// Event bus behavior.
    pub events: EventSettings,
    /// Debugger bridge behavior.
    pub debugger: DebuggerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl CodotSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if self.server.handler_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.handlerTimeoutMs must be at least 1".into(),
            ));
        }
        if self.events.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "events.queueCapacity must be at least 1".into(),
            ));
        }
        if self.debugger.log_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "debugger.logCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum simultaneous client connections.
    pub max_connections: usize,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Interval between WebSocket pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A client silent for this long is disconnected.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single command handler.
    pub handler_timeout_ms: u64,
    /// Per-connection outbound queue depth.
    pub outbound_queue: usize,
    /// Grace period for in-flight tasks during shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: codot_core::DEFAULT_PORT,
            max_connections: 32,
            max_message_size: 16 * 1024 * 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            handler_timeout_ms: 300_000,
            outbound_queue: 256,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Event bus settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Capacity of the shared event queue.
    pub queue_capacity: usize,
    /// Drop a connection's subscriptions when it disconnects.
    pub clear_on_disconnect: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            clear_on_disconnect: false,
        }
    }
}

/// Debugger bridge settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebuggerSettings {
    /// Captured log entries retained before the oldest is evicted.
    pub log_capacity: usize,
}

impl Default for DebuggerSettings {
    fn default() -> Self {
        Self { log_capacity: 1000 }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level.
    pub level: LogLevel,
    /// One JSON object per line instead of the compact format.
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(CodotSettings::default()).unwrap();
        assert_eq!(json["server"]["maxConnections"], 32);
        assert_eq!(json["events"]["clearOnDisconnect"], false);
        assert_eq!(json["logging"]["level"], "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: CodotSettings =
            serde_json::from_str(r#"{"server": {"port": 7000}}"#).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.events.queue_capacity, 100);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(CodotSettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut settings = CodotSettings::default();
        settings.events.queue_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("queueCapacity"));
    }
}
