//! `batch_commands`: run a list of commands sequentially in one round trip.
//!
//! Every item goes through the normal single-command dispatch path under a
//! synthesized id `"<batch uuid>:<index>"`; the client's outer id is only
//! used for the batch envelope itself.

use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::context::RpcContext;
use crate::errors;
use crate::registry::MethodRegistry;
use crate::types::{RpcErrorBody, RpcRequest, RpcResponse};

/// Wire name of the batch command.
pub const BATCH_COMMAND: &str = "batch_commands";

/// Outcome of one batch item.
#[derive(Debug)]
struct ItemOutcome {
    index: usize,
    command: String,
    response: RpcResponse,
}

impl ItemOutcome {
    fn error_body(&self) -> RpcErrorBody {
        self.response.error.clone().unwrap_or_else(|| RpcErrorBody {
            code: errors::INTERNAL_ERROR.to_owned(),
            message: "Unknown error".to_owned(),
            details: None,
        })
    }

    fn to_record(&self) -> Value {
        let mut record = Map::new();
        let _ = record.insert("index".into(), json!(self.index));
        let _ = record.insert("command".into(), json!(self.command));
        let _ = record.insert("success".into(), json!(self.response.success));
        if let Some(result) = &self.response.result {
            let _ = record.insert("result".into(), result.clone());
        }
        if let Some(error) = &self.response.error {
            let _ = record.insert("error".into(), json!(error));
        }
        Value::Object(record)
    }
}

/// Parsed batch parameters.
struct BatchParams {
    commands: Vec<Value>,
    stop_on_error: bool,
    return_all_results: bool,
}

impl BatchParams {
    fn parse(params: &Value) -> Result<Self, (&'static str, String)> {
        let commands = match params.get("commands") {
            None | Some(Value::Null) => {
                return Err((errors::MISSING_PARAM, "Missing required parameter: commands".into()));
            }
            Some(Value::Array(items)) if items.is_empty() => {
                return Err((errors::MISSING_PARAM, "'commands' must not be empty".into()));
            }
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err((errors::INVALID_PARAMS, "'commands' must be an array".into()));
            }
        };
        Ok(Self {
            commands,
            stop_on_error: flag(params, "stop_on_error", true)?,
            return_all_results: flag(params, "return_all_results", false)?,
        })
    }
}

fn flag(params: &Value, key: &str, default: bool) -> Result<bool, (&'static str, String)> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err((errors::INVALID_PARAMS, format!("'{key}' must be a boolean"))),
    }
}

/// Execute a `batch_commands` request.
#[instrument(skip_all, fields(batch_id))]
pub async fn execute(registry: &MethodRegistry, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
    let RpcRequest { id, params, .. } = request;
    let batch = match BatchParams::parse(&params) {
        Ok(batch) => batch,
        Err((code, message)) => return RpcResponse::error(id, code, message),
    };

    let batch_id = Uuid::now_v7();
    let _ = tracing::Span::current().record("batch_id", tracing::field::display(batch_id));
    let total = batch.commands.len();
    let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(total);
    let mut failed = 0usize;

    for (index, item) in batch.commands.into_iter().enumerate() {
        let outcome = run_item(registry, ctx, &batch_id, index, item).await;
        let ok = outcome.response.success;
        if !ok {
            failed += 1;
        }
        outcomes.push(outcome);

        if !ok && batch.stop_on_error {
            let executed = outcomes.len();
            let Some(last) = outcomes.last() else { break };
            let error = last.error_body();
            debug!(index, command = %last.command, code = %error.code, "batch stopped on error");
            return RpcResponse::error_with_details(
                id,
                errors::BATCH_FAILED,
                format!("Batch command {index} ({}) failed: {}", last.command, error.message),
                json!({
                    "index": index,
                    "command": last.command,
                    "executed": executed,
                    "failed": failed,
                    "total": total,
                    "error": error,
                }),
            );
        }
    }

    let executed = outcomes.len();
    let mut summary = Map::new();
    let _ = summary.insert("executed".into(), json!(executed));
    let _ = summary.insert("failed".into(), json!(failed));
    let _ = summary.insert("total".into(), json!(total));
    if batch.return_all_results {
        let results: Vec<Value> = outcomes.iter().map(ItemOutcome::to_record).collect();
        let _ = summary.insert("results".into(), Value::Array(results));
    } else {
        let last_result = outcomes
            .last()
            .and_then(|o| o.response.result.clone())
            .unwrap_or(Value::Null);
        let _ = summary.insert("last_result".into(), last_result);
    }

    if failed == 0 {
        debug!(executed, "batch succeeded");
        return RpcResponse::success(id, Value::Object(summary));
    }

    let failures: Vec<Value> = outcomes
        .iter()
        .filter(|o| !o.response.success)
        .map(|o| json!({"index": o.index, "command": o.command, "error": o.error_body()}))
        .collect();
    let _ = summary.insert("failures".into(), Value::Array(failures));
    debug!(executed, failed, "batch finished with failures");
    RpcResponse::error_with_details(
        id,
        errors::BATCH_PARTIAL_FAILURE,
        format!("{failed} of {total} batch commands failed"),
        Value::Object(summary),
    )
}

async fn run_item(
    registry: &MethodRegistry,
    ctx: &RpcContext,
    batch_id: &Uuid,
    index: usize,
    item: Value,
) -> ItemOutcome {
    let sub_id = Value::String(format!("{batch_id}:{index}"));
    let frame = match item {
        Value::Object(mut map) => {
            let _ = map.insert("id".into(), sub_id.clone());
            Value::Object(map)
        }
        other => other,
    };

    let request = match RpcRequest::from_value(frame) {
        Ok(request) => request,
        Err(mut response) => {
            response.id = sub_id;
            return ItemOutcome {
                index,
                command: String::new(),
                response,
            };
        }
    };

    let command = request.command.clone();
    if command == BATCH_COMMAND {
        return ItemOutcome {
            index,
            command,
            response: RpcResponse::error(
                sub_id,
                errors::INVALID_PARAMS,
                "batch_commands cannot be nested",
            ),
        };
    }

    let response = registry.dispatch_single(request, ctx).await;
    ItemOutcome {
        index,
        command,
        response,
    }
}
