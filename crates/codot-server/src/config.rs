//! Server configuration.

use std::time::Duration;

use codot_settings::CodotSettings;

/// Runtime configuration for [`CodotServer`](crate::CodotServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent client connections, pending handshakes included.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Disconnect a client after this long without a pong.
    pub heartbeat_timeout: Duration,
    /// Upper bound on a single command handler.
    pub handler_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_queue: usize,
    /// How long `shutdown` waits for connection tasks.
    pub shutdown_timeout: Duration,
    /// Drop a connection's subscriptions when it disconnects.
    pub clear_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 32,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            handler_timeout: Duration::from_secs(300),
            outbound_queue: 256,
            shutdown_timeout: Duration::from_secs(5),
            clear_on_disconnect: false,
        }
    }
}

impl From<&CodotSettings> for ServerConfig {
    fn from(settings: &CodotSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            handler_timeout: Duration::from_millis(server.handler_timeout_ms),
            outbound_queue: server.outbound_queue.max(1),
            shutdown_timeout: Duration::from_millis(server.shutdown_timeout_ms),
            clear_on_disconnect: settings.events.clear_on_disconnect,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn from_settings() {
        let mut settings = CodotSettings::default();
        settings.server.port = 7000;
        settings.server.heartbeat_interval_ms = 1500;
        settings.events.clear_on_disconnect = true;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(1500));
        assert_eq!(cfg.handler_timeout, Duration::from_secs(300));
        assert!(cfg.clear_on_disconnect);
    }

    #[test]
    fn settings_defaults_carry_protocol_port() {
        let cfg = ServerConfig::from(&CodotSettings::default());
        assert_eq!(cfg.port, codot_core::DEFAULT_PORT);
        assert_eq!(cfg.max_connections, 32);
    }

    #[test]
    fn bind_addr_format() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }
}
