//! Command registry and async dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::batch;
use crate::context::RpcContext;
use crate::errors::{self, RpcError};
use crate::types::{RpcRequest, RpcResponse};

/// Trait implemented by every command handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler. `params` is always a JSON object.
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping command names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    handler_timeout: Duration,
}

impl MethodRegistry {
    /// Default upper bound on a single handler.
    pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

    /// Requests slower than this are logged at warn.
    const SLOW_REQUEST: Duration = Duration::from_secs(5);

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            handler_timeout: Self::DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the handler timeout.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register a handler, replacing any previous one under `command`.
    pub fn register(&mut self, command: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(command.to_owned(), Arc::new(handler));
    }

    /// Validate a parsed frame and dispatch it.
    pub async fn dispatch_value(&self, frame: Value, ctx: &RpcContext) -> RpcResponse {
        match RpcRequest::from_value(frame) {
            Ok(request) => self.dispatch(request, ctx).await,
            Err(response) => {
                counter!("rpc_errors_total", "command" => "", "error_type" => errors::MISSING_COMMAND).increment(1);
                response
            }
        }
    }

    /// Dispatch a validated request. `batch_commands` is routed to the
    /// batch executor; everything else is a flat handler lookup.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        if request.command == batch::BATCH_COMMAND {
            let start = Instant::now();
            counter!("rpc_requests_total", "command" => batch::BATCH_COMMAND).increment(1);
            let response = batch::execute(self, request, ctx).await;
            if let Some(code) = response.error_code() {
                counter!("rpc_errors_total", "command" => batch::BATCH_COMMAND, "error_type" => code.to_owned()).increment(1);
            }
            record_duration(batch::BATCH_COMMAND, start.elapsed());
            return response;
        }
        self.dispatch_single(request, ctx).await
    }

    /// Dispatch one non-batch request.
    #[instrument(skip_all, fields(command = %request.command, conn_id = ?ctx.connection_id))]
    pub(crate) async fn dispatch_single(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let RpcRequest { id, command, params } = request;
        counter!("rpc_requests_total", "command" => command.clone()).increment(1);

        let Some(handler) = self.handlers.get(&command) else {
            counter!("rpc_errors_total", "command" => command.clone(), "error_type" => errors::UNKNOWN_COMMAND).increment(1);
            debug!("unknown command");
            return RpcResponse::error(
                id,
                errors::UNKNOWN_COMMAND,
                format!("Unknown command: {command}"),
            );
        };

        let start = Instant::now();
        let guarded = AssertUnwindSafe(handler.handle(params, ctx)).catch_unwind();
        let result = tokio::time::timeout(self.handler_timeout, guarded).await;

        let response = match result {
            Ok(Ok(Ok(value))) => RpcResponse::success(id, value),
            Ok(Ok(Err(err))) => {
                counter!("rpc_errors_total", "command" => command.clone(), "error_type" => err.code().to_owned()).increment(1);
                debug!(code = err.code(), error = %err, "handler returned error");
                RpcResponse::from_error_body(id, err.to_error_body())
            }
            Ok(Err(panic)) => {
                counter!("rpc_errors_total", "command" => command.clone(), "error_type" => "panic").increment(1);
                let detail = panic_message(panic.as_ref());
                error!(panic = %detail, "handler panicked");
                RpcResponse::error(
                    id,
                    errors::INTERNAL_ERROR,
                    format!("Internal error in '{command}': {detail}"),
                )
            }
            Err(_elapsed) => {
                counter!("rpc_errors_total", "command" => command.clone(), "error_type" => "timeout").increment(1);
                error!(timeout = ?self.handler_timeout, "handler timed out");
                RpcResponse::error(
                    id,
                    errors::INTERNAL_ERROR,
                    format!("Handler for '{command}' timed out"),
                )
            }
        };

        record_duration(&command, start.elapsed());
        response
    }

    /// All registered command names plus `batch_commands`, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.push(batch::BATCH_COMMAND.to_owned());
        names.sort();
        names.dedup();
        names
    }

    /// Whether `command` can be dispatched.
    pub fn has_method(&self, command: &str) -> bool {
        command == batch::BATCH_COMMAND || self.handlers.contains_key(command)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn record_duration(command: &str, duration: Duration) {
    histogram!("rpc_request_duration_seconds", "command" => command.to_owned()).record(duration.as_secs_f64());
    if duration >= MethodRegistry::SLOW_REQUEST {
        warn!(command, duration_secs = duration.as_secs_f64(), "slow command");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Test handler implementations ────────────────────────────────

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Ok(params)
        }
    }

    struct FailHandler;

    #[async_trait]
    impl MethodHandler for FailHandler {
        async fn handle(&self, _params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Err(RpcError::Custom {
                code: "NODE_NOT_FOUND".into(),
                message: "no such node".into(),
                details: Some(json!({"path": "/root/Missing"})),
            })
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl MethodHandler for PanicHandler {
        async fn handle(&self, _params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
            panic!("exploded");
        }
    }

    struct SlowHandler {
        delay: Duration,
    }

    #[async_trait]
    impl MethodHandler for SlowHandler {
        async fn handle(&self, _params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
            tokio::time::sleep(self.delay).await;
            Ok(json!("done"))
        }
    }

    fn registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        reg.register("echo", EchoHandler);
        reg.register("fail", FailHandler);
        reg.register("explode", PanicHandler);
        reg
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_success() {
        let ctx = RpcContext::default();
        let resp = registry()
            .dispatch_value(json!({"id": "r1", "command": "echo", "params": {"x": 1}}), &ctx)
            .await;
        assert!(resp.success);
        assert_eq!(resp.id, json!("r1"));
        assert_eq!(resp.result.unwrap()["x"], 1);
    }

    #[tokio::test]
    async fn id_is_echoed_for_every_scalar_kind() {
        let ctx = RpcContext::default();
        let reg = registry();
        for id in [json!(null), json!(42), json!("abc"), json!(1.5)] {
            let ok = reg.dispatch_value(json!({"id": id, "command": "echo"}), &ctx).await;
            assert_eq!(ok.id, id);
            let unknown = reg.dispatch_value(json!({"id": id, "command": "nope"}), &ctx).await;
            assert_eq!(unknown.id, id);
            let fail = reg.dispatch_value(json!({"id": id, "command": "fail"}), &ctx).await;
            assert_eq!(fail.id, id);
        }
        let missing = reg.dispatch_value(json!({"command": "echo"}), &ctx).await;
        assert!(missing.id.is_null());
    }

    #[tokio::test]
    async fn unknown_command() {
        let ctx = RpcContext::default();
        let resp = registry()
            .dispatch_value(json!({"id": 1, "command": "get_scene_tree"}), &ctx)
            .await;
        assert!(!resp.success);
        let err = resp.error.unwrap();
        assert_eq!(err.code, "UNKNOWN_COMMAND");
        assert!(err.message.contains("get_scene_tree"));
    }

    #[tokio::test]
    async fn missing_command() {
        let ctx = RpcContext::default();
        let resp = registry().dispatch_value(json!({"id": 1, "params": {}}), &ctx).await;
        assert_eq!(resp.error_code(), Some("MISSING_COMMAND"));
    }

    #[tokio::test]
    async fn handler_error_keeps_code_and_details() {
        let ctx = RpcContext::default();
        let resp = registry().dispatch_value(json!({"id": 2, "command": "fail"}), &ctx).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, "NODE_NOT_FOUND");
        assert_eq!(err.details.unwrap()["path"], "/root/Missing");
        assert!(resp.result.is_none());
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let ctx = RpcContext::default();
        let reg = registry();
        let resp = reg.dispatch_value(json!({"id": 3, "command": "explode"}), &ctx).await;
        assert_eq!(resp.id, json!(3));
        let err = resp.error.unwrap();
        assert_eq!(err.code, "INTERNAL_ERROR");
        assert!(err.message.contains("exploded"));

        // the registry keeps working afterwards
        let resp = reg.dispatch_value(json!({"id": 4, "command": "echo"}), &ctx).await;
        assert!(resp.success);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_internal_error() {
        let ctx = RpcContext::default();
        let mut reg = MethodRegistry::new().with_handler_timeout(Duration::from_secs(1));
        reg.register(
            "slow",
            SlowHandler {
                delay: Duration::from_secs(120),
            },
        );
        let resp = reg.dispatch_value(json!({"id": "t", "command": "slow"}), &ctx).await;
        assert_eq!(resp.id, json!("t"));
        let err = resp.error.unwrap();
        assert_eq!(err.code, "INTERNAL_ERROR");
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn fast_handler_unaffected_by_timeout() {
        let ctx = RpcContext::default();
        let mut reg = MethodRegistry::new();
        reg.register(
            "fast",
            SlowHandler {
                delay: Duration::from_millis(1),
            },
        );
        let resp = reg.dispatch_value(json!({"id": 1, "command": "fast"}), &ctx).await;
        assert_eq!(resp.result.unwrap(), "done");
    }

    #[test]
    fn methods_are_sorted_and_include_batch() {
        let mut reg = MethodRegistry::new();
        reg.register("b_cmd", EchoHandler);
        reg.register("a_cmd", EchoHandler);
        assert_eq!(reg.methods(), vec!["a_cmd", "b_cmd", "batch_commands"]);
        assert!(reg.has_method("batch_commands"));
        assert!(reg.has_method("a_cmd"));
        assert!(!reg.has_method("c_cmd"));
    }

    #[tokio::test]
    async fn register_overwrites_previous() {
        let ctx = RpcContext::default();
        let mut reg = MethodRegistry::new();
        reg.register("test", EchoHandler);
        reg.register("test", FailHandler);
        let resp = reg.dispatch_value(json!({"id": 1, "command": "test"}), &ctx).await;
        assert!(!resp.success);
    }
}
