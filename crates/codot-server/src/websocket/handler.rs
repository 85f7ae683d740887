//! Frame dispatch: parse one text frame as JSON and route it through the
//! command registry.

use codot_rpc::{MethodRegistry, RpcContext, RpcResponse};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::metrics::WS_MALFORMED_FRAMES_TOTAL;

/// Handle one complete text frame.
///
/// Returns `None` for frames that are not valid JSON: those are logged and
/// dropped, never answered, and never close the connection.
#[instrument(skip_all, fields(conn_id = ?ctx.connection_id))]
pub async fn handle_message(message: &str, registry: &MethodRegistry, ctx: &RpcContext) -> Option<RpcResponse> {
    let frame: Value = match serde_json::from_str(message) {
        Ok(frame) => frame,
        Err(e) => {
            counter!(WS_MALFORMED_FRAMES_TOTAL).increment(1);
            warn!(error = %e, len = message.len(), "dropping malformed frame");
            return None;
        }
    };

    if let Some(command) = frame.get("command").and_then(Value::as_str) {
        debug!(command, "dispatching command");
        if !registry.has_method(command) {
            warn!(command, "unknown command");
        }
    }
    Some(registry.dispatch_value(frame, ctx).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codot_rpc::handlers::register_all;
    use serde_json::json;

    fn registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        register_all(&mut reg);
        reg
    }

    #[tokio::test]
    async fn valid_ping_dispatches() {
        let ctx = RpcContext::default();
        let resp = handle_message(r#"{"id":1,"command":"ping","params":{}}"#, &registry(), &ctx)
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.id, json!(1));
        assert_eq!(resp.result.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn malformed_json_is_dropped() {
        let ctx = RpcContext::default();
        assert!(handle_message("{not json", &registry(), &ctx).await.is_none());
        assert!(handle_message("", &registry(), &ctx).await.is_none());
    }

    #[tokio::test]
    async fn non_object_json_gets_missing_command() {
        let ctx = RpcContext::default();
        let resp = handle_message("[1,2,3]", &registry(), &ctx).await.unwrap();
        assert_eq!(resp.error_code(), Some("MISSING_COMMAND"));
        assert!(resp.id.is_null());
    }

    #[tokio::test]
    async fn unknown_command_echoes_string_id() {
        let ctx = RpcContext::default();
        let resp = handle_message(r#"{"id":"abc","command":"get_scene_tree"}"#, &registry(), &ctx)
            .await
            .unwrap();
        assert_eq!(resp.id, json!("abc"));
        assert_eq!(resp.error_code(), Some("UNKNOWN_COMMAND"));
    }
}
