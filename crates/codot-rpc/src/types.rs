//! Wire envelopes.
//!
//! Client to server: `{"id": <any scalar>, "command": <string>, "params": <object?>}`.
//! Server to client: `{"id", "success": true, "result"}` or
//! `{"id", "success": false, "error": {"code", "message", "details"?}}`.

use codot_events::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors;

/// A validated command request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Opaque request id, echoed verbatim. `null` when absent.
    #[serde(default)]
    pub id: Value,
    /// Command name, non-empty.
    pub command: String,
    /// Parameters, always an object.
    #[serde(default = "empty_object")]
    pub params: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl RpcRequest {
    /// Build a request with the given params.
    pub fn new(id: Value, command: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            command: command.into(),
            params,
        }
    }

    /// Validate a parsed frame.
    ///
    /// A missing, empty or non-string `command` yields `MISSING_COMMAND`;
    /// `params` that are neither absent, `null` nor an object yield
    /// `INVALID_PARAMS`. The error response carries the frame's id.
    pub fn from_value(frame: Value) -> Result<Self, RpcResponse> {
        let Value::Object(mut map) = frame else {
            return Err(RpcResponse::error(
                Value::Null,
                errors::MISSING_COMMAND,
                "Request must be a JSON object with a 'command' field",
            ));
        };
        let id = map.remove("id").unwrap_or(Value::Null);

        let command = match map.remove("command") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => {
                return Err(RpcResponse::error(
                    id,
                    errors::MISSING_COMMAND,
                    "Missing 'command' field",
                ));
            }
        };

        let params = match map.remove("params") {
            None | Some(Value::Null) => empty_object(),
            Some(p @ Value::Object(_)) => p,
            Some(_) => {
                return Err(RpcResponse::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("'params' for '{command}' must be an object"),
                ));
            }
        };

        Ok(Self { id, command, params })
    }
}

/// Response envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request id.
    pub id: Value,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result payload (present iff `success`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present iff not `success`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error inside an [`RpcResponse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable code (e.g. `UNKNOWN_COMMAND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_error_body(
            id,
            RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        )
    }

    /// Build an error response with structured details.
    pub fn error_with_details(
        id: Value,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self::from_error_body(
            id,
            RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        )
    }

    /// Build an error response from a prepared body.
    pub fn from_error_body(id: Value, body: RpcErrorBody) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(body),
        }
    }

    /// Error code, if this is a failure.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Server-pushed event frame: `{"type": "event", "event": {...}}`.
#[derive(Clone, Debug, Serialize)]
pub struct EventNotification<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    /// The event.
    pub event: &'a Event,
}

impl<'a> EventNotification<'a> {
    /// Wrap an event for pushing.
    pub fn new(event: &'a Event) -> Self {
        Self { kind: "event", event }
    }
}
