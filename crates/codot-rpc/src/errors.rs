//! Error codes and the handler-facing error type.

use codot_core::host::HostError;
use codot_debugger::DebuggerError;
use codot_events::EventBusError;
use serde_json::Value;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Request has no usable `command`.
pub const MISSING_COMMAND: &str = "MISSING_COMMAND";
/// No handler registered under the command name.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
/// A required parameter is absent.
pub const MISSING_PARAM: &str = "MISSING_PARAM";
/// A parameter has the wrong type or value.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected failure, including handler panics and timeouts.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// A capability is not available.
pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";
/// Generic lookup miss.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// A batch stopped at its first failing item.
pub const BATCH_FAILED: &str = "BATCH_FAILED";
/// A batch ran every item and at least one failed.
pub const BATCH_PARTIAL_FAILURE: &str = "BATCH_PARTIAL_FAILURE";

/// Error returned by command handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter absent.
    #[error("{message}")]
    MissingParam {
        /// What is missing.
        message: String,
    },

    /// Parameter present but wrong type or out of range.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Specific code (e.g. `SCENE_NOT_FOUND`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Internal failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Capability not available.
    #[error("{message}")]
    NotAvailable {
        /// Description.
        message: String,
    },

    /// Domain error with an arbitrary code.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<Value>,
    },
}

impl RpcError {
    /// Shorthand for [`RpcError::MissingParam`] naming `key`.
    pub fn missing(key: &str) -> Self {
        Self::MissingParam {
            message: format!("Missing required parameter: {key}"),
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            Self::MissingParam { .. } => MISSING_PARAM,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotFound { code, .. } | Self::Custom { code, .. } => code,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::NotAvailable { .. } => NOT_AVAILABLE,
        }
    }

    /// Convert to the wire error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Custom { details, .. } => details.clone(),
                _ => None,
            },
        }
    }
}

impl From<EventBusError> for RpcError {
    fn from(err: EventBusError) -> Self {
        Self::Custom {
            code: err.code().to_owned(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<DebuggerError> for RpcError {
    fn from(err: DebuggerError) -> Self {
        match err {
            DebuggerError::InvalidArgument(message) => Self::InvalidParams { message },
            DebuggerError::Host(host) => host.into(),
            other => Self::Custom {
                code: other.code().to_owned(),
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl From<HostError> for RpcError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::SceneNotFound(_) => Self::NotFound {
                code: err.code().to_owned(),
                message: err.to_string(),
            },
            _ => Self::Custom {
                code: err.code().to_owned(),
                message: err.to_string(),
                details: None,
            },
        }
    }
}
