//! Core handlers: ping, get_status.

use async_trait::async_trait;
use codot_core::time::unix_timestamp;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::MethodHandler;

/// Returns a pong with the current server timestamp.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    #[instrument(skip(self, _ctx), fields(method = "ping"))]
    async fn handle(&self, _params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "pong": true,
            "timestamp": unix_timestamp(),
        }))
    }
}

/// Returns version, uptime, editor/game state and the command list.
pub struct GetStatusHandler {
    commands: Vec<String>,
}

impl GetStatusHandler {
    /// Build with the names reported under `commands`.
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl MethodHandler for GetStatusHandler {
    #[instrument(skip(self, ctx), fields(method = "get_status"))]
    async fn handle(&self, _params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": ctx.server_start_time.elapsed().as_secs(),
            "editor_available": ctx.host.is_available(),
            "editor_version": ctx.host.editor_version(),
            "playing": ctx.host.is_playing(),
            "game_session_active": ctx.bridge.has_active_session(),
            "commands": self.commands,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::make_test_context;

    #[tokio::test]
    async fn ping_returns_pong() {
        let ctx = make_test_context();
        let before = unix_timestamp();
        let result = PingHandler.handle(json!({}), &ctx).await.unwrap();
        let after = unix_timestamp();
        assert_eq!(result["pong"], true);
        let ts = result["timestamp"].as_f64().unwrap();
        assert!(ts >= before && ts <= after);
    }

    #[tokio::test]
    async fn status_without_editor() {
        let ctx = make_test_context();
        let handler = GetStatusHandler::new(vec!["get_status".into(), "ping".into()]);
        let result = handler.handle(json!({}), &ctx).await.unwrap();
        assert!(result["version"].is_string());
        assert_eq!(result["editor_available"], false);
        assert!(result["editor_version"].is_null());
        assert_eq!(result["playing"], false);
        assert_eq!(result["game_session_active"], false);
        assert_eq!(result["commands"], json!(["get_status", "ping"]));
    }

    #[tokio::test]
    async fn registered_status_lists_itself() {
        let mut reg = crate::registry::MethodRegistry::new();
        crate::handlers::register_all(&mut reg);
        let ctx = make_test_context();
        let resp = reg
            .dispatch_value(json!({"id": 1, "command": "get_status"}), &ctx)
            .await;
        let commands = resp.result.unwrap()["commands"].clone();
        let commands: Vec<String> = serde_json::from_value(commands).unwrap();
        assert!(commands.contains(&"get_status".to_owned()));
        assert!(commands.contains(&"batch_commands".to_owned()));
        let mut sorted = commands.clone();
        sorted.sort();
        assert_eq!(commands, sorted);
    }
}
