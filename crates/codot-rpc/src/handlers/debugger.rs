//! Debugger bridge handlers.
//!
//! Everything here reads the captured game output or talks to the running
//! game through the session channel. Waiting handlers (`ping_game`,
//! `take_screenshot`, `run_and_capture`, `wait_for_output`) take a bounded
//! timeout and report "not received" as a normal result.

use async_trait::async_trait;
use codot_debugger::{CaptureRequest, EntryFilter, WaitTarget, run_and_capture};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::{opt_bool_param, opt_count_param, opt_seconds_param, opt_string_param, opt_u64_param};
use crate::registry::MethodHandler;

const DEFAULT_LINES: usize = 50;
const DEFAULT_PING_TIMEOUT: f64 = 2.0;
const DEFAULT_SCREENSHOT_PATH: &str = "user://screenshot.png";
const DEFAULT_SCREENSHOT_TIMEOUT: f64 = 5.0;
const DEFAULT_CAPTURE_DURATION: f64 = 2.0;
const DEFAULT_WAIT_TIMEOUT: f64 = 5.0;
const DEFAULT_WAIT_POLL: f64 = 0.25;

fn to_json(value: &impl Serialize) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal {
        message: e.to_string(),
    })
}

fn filter_param(params: &Value) -> Result<EntryFilter, RpcError> {
    Ok(opt_string_param(params, "filter")?
        .as_deref()
        .unwrap_or("all")
        .parse::<EntryFilter>()?)
}

/// Captured game output after a watermark.
pub struct GetDebugOutputHandler;

#[async_trait]
impl MethodHandler for GetDebugOutputHandler {
    #[instrument(skip(self, ctx), fields(method = "get_debug_output"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let lines = opt_count_param(&params, "lines", DEFAULT_LINES)?;
        let filter = filter_param(&params)?;
        let since_id = opt_u64_param(&params, "since_id", 0)?;

        let page = ctx.bridge.get_entries(filter, since_id, lines);
        Ok(json!({
            "count": page.entries.len(),
            "entries": page.entries,
            "last_id": page.last_id,
            "latest_id": page.latest_id,
            "session_active": ctx.bridge.has_active_session(),
        }))
    }
}

/// Return the current watermark. The log itself is not truncated; pass the
/// returned `since_id` to `get_debug_output` to see only newer entries.
pub struct ClearDebugLogHandler;

#[async_trait]
impl MethodHandler for ClearDebugLogHandler {
    #[instrument(skip(self, ctx), fields(method = "clear_debug_log"))]
    async fn handle(&self, _params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "cleared": true,
            "since_id": ctx.bridge.mark_position(),
        }))
    }
}

/// Bridge diagnostics.
pub struct GetDebuggerStatusHandler;

#[async_trait]
impl MethodHandler for GetDebuggerStatusHandler {
    #[instrument(skip(self, ctx), fields(method = "get_debugger_status"))]
    async fn handle(&self, _params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let mut status = to_json(&ctx.bridge.status())?;
        if let Some(obj) = status.as_object_mut() {
            let _ = obj.insert("sessions".into(), to_json(&ctx.bridge.get_sessions())?);
        }
        Ok(status)
    }
}

/// Round-trip liveness check with the game.
pub struct PingGameHandler;

#[async_trait]
impl MethodHandler for PingGameHandler {
    #[instrument(skip(self, ctx), fields(method = "ping_game"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let timeout = opt_seconds_param(&params, "timeout", DEFAULT_PING_TIMEOUT)?;
        let result = ctx.bridge.ping(timeout).await?;
        to_json(&result)
    }
}

/// Editor play state plus session and capture health.
pub struct GetGameStateHandler;

#[async_trait]
impl MethodHandler for GetGameStateHandler {
    #[instrument(skip(self, ctx), fields(method = "get_game_state"))]
    async fn handle(&self, _params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let status = ctx.bridge.status();
        Ok(json!({
            "editor_available": ctx.host.is_available(),
            "playing": ctx.host.is_playing(),
            "game_session_active": ctx.bridge.has_active_session(),
            "session": ctx.bridge.current_session(),
            "game_capture_active": status.game_capture_active,
            "message_types_seen": status.message_types_seen,
            "last_test_result": status.last_test_result,
        }))
    }
}

/// Ask the running game for a screenshot.
pub struct TakeScreenshotHandler;

#[async_trait]
impl MethodHandler for TakeScreenshotHandler {
    #[instrument(skip(self, ctx), fields(method = "take_screenshot"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let path = opt_string_param(&params, "path")?
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_SCREENSHOT_PATH.to_owned());
        let delay = opt_seconds_param(&params, "delay", 0.0)?;
        let timeout = opt_seconds_param(&params, "timeout", DEFAULT_SCREENSHOT_TIMEOUT)?;
        let result = ctx.bridge.take_screenshot(&path, delay, timeout).await?;
        to_json(&result)
    }
}

/// Play a scene for a while and summarize what it printed.
pub struct RunAndCaptureHandler;

#[async_trait]
impl MethodHandler for RunAndCaptureHandler {
    #[instrument(skip(self, ctx), fields(method = "run_and_capture"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let request = CaptureRequest {
            scene: opt_string_param(&params, "scene")?.filter(|s| !s.is_empty()),
            duration: opt_seconds_param(&params, "duration", DEFAULT_CAPTURE_DURATION)?,
            filter: filter_param(&params)?,
            stop_on_error: opt_bool_param(&params, "stop_on_error", false)?,
        };
        let summary = run_and_capture(&ctx.bridge, ctx.host.as_ref(), request, &ctx.shutdown).await?;
        to_json(&summary)
    }
}

/// Block until matching output appears or the timeout passes.
pub struct WaitForOutputHandler;

#[async_trait]
impl MethodHandler for WaitForOutputHandler {
    #[instrument(skip(self, ctx), fields(method = "wait_for_output"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let target = match opt_string_param(&params, "wait_for")? {
            Some(s) if !s.is_empty() => WaitTarget::parse(&s),
            _ => WaitTarget::Any,
        };
        let timeout = opt_seconds_param(&params, "timeout", DEFAULT_WAIT_TIMEOUT)?;
        let poll_interval = opt_seconds_param(&params, "poll_interval", DEFAULT_WAIT_POLL)?;
        let result = ctx
            .bridge
            .wait_for_output(&target, timeout, poll_interval, &ctx.shutdown)
            .await;
        to_json(&result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use codot_core::host::{EditorHost, HostError};
    use codot_core::ids::SessionId;
    use codot_debugger::{DebuggerBridge, GameMessage, LogEntryType, SessionChannel, messages};
    use codot_events::EventBus;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::handlers::test_helpers::make_test_context;

    mockall::mock! {
        Host {}
        impl EditorHost for Host {
            fn is_available(&self) -> bool;
            fn play(&self, scene: Option<String>) -> Result<(), HostError>;
            fn stop(&self) -> Result<(), HostError>;
            fn is_playing(&self) -> bool;
        }
    }

    /// Game stand-in that answers pings and screenshot requests at once.
    struct EchoGame {
        bridge: Arc<DebuggerBridge>,
    }

    impl SessionChannel for EchoGame {
        fn send(&self, message: GameMessage) -> bool {
            match message.message.as_str() {
                messages::PING => self.bridge.ingest(SessionId::new(1), messages::PONG, json!({})),
                messages::SCREENSHOT => self.bridge.ingest(
                    SessionId::new(1),
                    messages::SCREENSHOT_TAKEN,
                    json!({"path": message.data["path"]}),
                ),
                _ => {}
            }
            true
        }
    }

    /// Game stand-in that never answers.
    struct SilentGame;

    impl SessionChannel for SilentGame {
        fn send(&self, _message: GameMessage) -> bool {
            true
        }
    }

    fn context_with_host(host: impl EditorHost + 'static) -> RpcContext {
        RpcContext::new(
            Arc::new(EventBus::default()),
            Arc::new(DebuggerBridge::default()),
            Arc::new(host),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn debug_output_respects_watermark_and_filter() {
        let ctx = make_test_context();
        let _ = ctx.bridge.append_local(LogEntryType::Error, "old error");
        let mark = ClearDebugLogHandler.handle(json!({}), &ctx).await.unwrap();
        let since = mark["since_id"].as_u64().unwrap();
        let _ = ctx.bridge.append_local(LogEntryType::Info, "hello");
        let _ = ctx.bridge.append_local(LogEntryType::Error, "new error");
        let _ = ctx.bridge.append_local(LogEntryType::ScriptError, "script");

        let out = GetDebugOutputHandler
            .handle(json!({"filter": "error", "since_id": since}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["entries"][0]["message"], "new error");
        for entry in out["entries"].as_array().unwrap() {
            assert!(entry["id"].as_u64().unwrap() > since);
            assert_eq!(entry["type"], "error");
        }
        assert_eq!(out["latest_id"], 4);
    }

    #[tokio::test]
    async fn debug_output_pages_by_last_id() {
        let ctx = make_test_context();
        for i in 0..5 {
            let _ = ctx.bridge.append_local(LogEntryType::Info, format!("line {i}"));
        }
        let first = GetDebugOutputHandler
            .handle(json!({"lines": 3}), &ctx)
            .await
            .unwrap();
        assert_eq!(first["count"], 3);
        let next = GetDebugOutputHandler
            .handle(json!({"lines": 3, "since_id": first["last_id"]}), &ctx)
            .await
            .unwrap();
        assert_eq!(next["count"], 2);
        assert_eq!(next["entries"][0]["message"], "line 3");
    }

    #[tokio::test]
    async fn debug_output_rejects_bad_filter() {
        let ctx = make_test_context();
        let err = GetDebugOutputHandler
            .handle(json!({"filter": "verbose"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn ping_game_without_session() {
        let ctx = make_test_context();
        let err = PingGameHandler.handle(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.code(), "NO_SESSION");
    }

    #[tokio::test]
    async fn ping_game_with_responsive_game() {
        let ctx = make_test_context();
        let _ = ctx.bridge.register_session(Arc::new(EchoGame {
            bridge: Arc::clone(&ctx.bridge),
        }));
        let result = PingGameHandler
            .handle(json!({"timeout": 1.0}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["pong"], true);
        assert!(result["latency_ms"].is_number());
    }

    #[tokio::test(start_paused = true)]
    async fn ping_game_timeout_is_not_an_error() {
        let ctx = make_test_context();
        let _ = ctx.bridge.register_session(Arc::new(SilentGame));
        let result = PingGameHandler
            .handle(json!({"timeout": 0.5}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["pong"], false);
        assert!(result.get("latency_ms").is_none());
    }

    #[tokio::test]
    async fn screenshot_round_trip() {
        let ctx = make_test_context();
        let _ = ctx.bridge.register_session(Arc::new(EchoGame {
            bridge: Arc::clone(&ctx.bridge),
        }));
        let result = TakeScreenshotHandler
            .handle(json!({"path": "user://shot.png", "timeout": 1.0}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["requested"], true);
        assert_eq!(result["received"], true);
        assert_eq!(result["path"], "user://shot.png");
    }

    #[tokio::test]
    async fn screenshot_needs_session() {
        let ctx = make_test_context();
        let err = TakeScreenshotHandler.handle(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.code(), "NO_SESSION");
    }

    #[tokio::test]
    async fn run_and_capture_without_editor() {
        let ctx = make_test_context();
        let err = RunAndCaptureHandler
            .handle(json!({"duration": 0.1}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_EDITOR");
    }

    #[tokio::test(start_paused = true)]
    async fn run_and_capture_full_duration() {
        let mut host = MockHost::new();
        let _ = host.expect_is_available().return_const(true);
        let _ = host.expect_play().times(1).returning(|_| Ok(()));
        let _ = host.expect_is_playing().return_const(false);
        let ctx = context_with_host(host);
        let _ = ctx.bridge.append_local(LogEntryType::Error, "before the run");

        let summary = RunAndCaptureHandler
            .handle(json!({"scene": "res://level.tscn", "duration": 0.5}), &ctx)
            .await
            .unwrap();
        assert_eq!(summary["scene"], "res://level.tscn");
        assert_eq!(summary["stopped_early"], false);
        assert_eq!(summary["since_id"], 1);
        assert_eq!(summary["error_count"], 0);
        assert_eq!(summary["success"], true);
        assert!(summary["elapsed"].as_f64().unwrap() >= 0.5);
    }

    #[tokio::test]
    async fn run_and_capture_rejects_long_duration() {
        let ctx = make_test_context();
        let err = RunAndCaptureHandler
            .handle(json!({"duration": 900}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_output_finds_substring() {
        let ctx = make_test_context();
        let bridge = Arc::clone(&ctx.bridge);
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = bridge.append_local(LogEntryType::Info, "level loaded");
        });
        let result = WaitForOutputHandler
            .handle(json!({"wait_for": "loaded", "timeout": 2.0, "poll_interval": 0.1}), &ctx)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(result["found"], true);
        assert_eq!(result["entry"]["message"], "level loaded");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_output_times_out() {
        let ctx = make_test_context();
        let result = WaitForOutputHandler
            .handle(json!({"wait_for": "error", "timeout": 0.5}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["found"], false);
        assert!(result.get("entry").is_none());
    }

    #[tokio::test]
    async fn status_and_game_state() {
        let ctx = make_test_context();
        let _ = ctx.bridge.register_session(Arc::new(SilentGame));
        ctx.bridge.ingest(SessionId::new(1), messages::READY, json!({}));

        let status = GetDebuggerStatusHandler.handle(json!({}), &ctx).await.unwrap();
        assert_eq!(status["session_count"], 1);
        assert_eq!(status["active_sessions"], 1);
        assert_eq!(status["game_capture_active"], true);
        assert_eq!(status["sessions"][0]["active"], true);

        let state = GetGameStateHandler.handle(json!({}), &ctx).await.unwrap();
        assert_eq!(state["editor_available"], false);
        assert_eq!(state["game_session_active"], true);
        assert_eq!(state["session"]["session_id"], 1);
        assert_eq!(state["message_types_seen"]["codot:ready"], 1);
    }
}
