//! # codot
//!
//! Codot server binary. Loads settings, installs logging, wires the event
//! bus, debugger bridge and command registry together, and serves until
//! interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use codot_core::host::{EditorHost, NullHost};
use codot_core::logging::{LogLevel, init_subscriber};
use codot_debugger::DebuggerBridge;
use codot_events::EventBus;
use codot_rpc::{MethodRegistry, RpcContext};
use codot_server::{CodotServer, ServerConfig};
use codot_settings::CodotSettings;
use tokio_util::sync::CancellationToken;

/// Codot editor automation server.
#[derive(Parser, Debug)]
#[command(name = "codot", version, about = "Editor automation server over WebSocket")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.codot/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum log level (overrides settings).
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<CodotSettings> {
        let path = self.config.clone().unwrap_or_else(codot_settings::settings_path);
        let mut settings = codot_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if self.log_json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

/// Build the root context and the full command registry from settings.
fn build(settings: &CodotSettings, host: Arc<dyn EditorHost>) -> (MethodRegistry, RpcContext) {
    let bus = Arc::new(EventBus::new(settings.events.queue_capacity));
    let bridge = DebuggerBridge::new(settings.debugger.log_capacity).with_event_bus(Arc::clone(&bus));
    let ctx = RpcContext::new(
        bus,
        Arc::new(bridge),
        host,
        CancellationToken::new(),
    );
    let mut registry = MethodRegistry::new();
    codot_rpc::handlers::register_all(&mut registry);
    (registry, ctx)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(settings.logging.level, settings.logging.json);

    let (registry, ctx) = build(&settings, Arc::new(NullHost));
    let method_count = registry.methods().len();
    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout;

    let server = CodotServer::new(config, registry, ctx);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Codot listening on ws://{addr} ({method_count} commands registered)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop();
    server
        .shutdown()
        .graceful_shutdown(vec![handle], shutdown_timeout)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let cli = Cli::parse_from(["codot", "--config", path.to_str().unwrap()]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, codot_core::DEFAULT_PORT);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert!(!settings.logging.json);
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"host": "0.0.0.0", "port": 7000}}"#).unwrap();
        let cli = Cli::parse_from([
            "codot",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7100",
            "--log-level",
            "debug",
            "--log-json",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert!(settings.logging.json);
    }

    #[test]
    fn bad_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        let cli = Cli::parse_from(["codot", "--config", path.to_str().unwrap()]);
        let err = cli.load_settings().unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }

    #[test]
    fn build_registers_every_command() {
        let (registry, _ctx) = build(&CodotSettings::default(), Arc::new(NullHost));
        for name in ["ping", "get_status", "batch_commands", "poll_events", "run_and_capture", "simulate_mouse_button"] {
            assert!(registry.has_method(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn server_starts_and_answers() {
        let mut settings = CodotSettings::default();
        settings.server.port = 0;
        let (registry, ctx) = build(&settings, Arc::new(NullHost));
        let server = CodotServer::new(ServerConfig::from(&settings), registry, ctx);
        let (addr, handle) = server.listen().await.unwrap();

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::Text(json!({"id": 1, "command": "get_status"}).to_string().into()))
            .await
            .unwrap();
        let reply = loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                break serde_json::from_str::<Value>(text.as_str()).unwrap();
            }
        };
        assert_eq!(reply["success"], true);
        assert_eq!(reply["result"]["game_session_active"], false);

        server.stop();
        server
            .shutdown()
            .graceful_shutdown(vec![handle], std::time::Duration::from_secs(2))
            .await;
    }
}
