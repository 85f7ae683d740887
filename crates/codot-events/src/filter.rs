//! Subscription filters.
//!
//! A filter is conjunctive over the keys that are present. An empty filter
//! matches every event of the subscribed type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventBusError;

/// Ordered event severity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Critical.
    Critical,
}

impl Severity {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EventBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(EventBusError::InvalidFilter(format!(
                "unknown severity '{other}', expected one of info, warning, error, critical"
            ))),
        }
    }
}

/// Predicate over an event payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Payload `path` must start with this prefix. A missing path is `""`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    /// Payload `node_type` must equal this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Payload `severity` must be at least this. A missing or unrecognized
    /// severity counts as `info`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<Severity>,
}

impl EventFilter {
    /// Build a filter from the `filter` request parameter.
    ///
    /// `None` and `null` give the empty filter. Anything other than an object
    /// with string-valued known keys is rejected. Unknown keys are ignored.
    pub fn from_param(value: Option<&Value>) -> Result<Self, EventBusError> {
        let map = match value {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(EventBusError::InvalidFilter(format!(
                    "filter must be an object, got {}",
                    json_kind(other)
                )));
            }
        };

        let string_key = |key: &str| -> Result<Option<String>, EventBusError> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(EventBusError::InvalidFilter(format!(
                    "'{key}' must be a string, got {}",
                    json_kind(other)
                ))),
            }
        };

        Ok(Self {
            path_prefix: string_key("path_prefix")?,
            node_type: string_key("node_type")?,
            min_severity: string_key("min_severity")?
                .map(|s| s.parse::<Severity>())
                .transpose()?,
        })
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none() && self.node_type.is_none() && self.min_severity.is_none()
    }

    /// Evaluate the filter against an event payload.
    pub fn matches(&self, payload: &Value) -> bool {
        if let Some(prefix) = &self.path_prefix {
            let path = payload.get("path").and_then(Value::as_str).unwrap_or("");
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(node_type) = &self.node_type {
            if payload.get("node_type").and_then(Value::as_str) != Some(node_type.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            let severity = payload
                .get("severity")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Severity>().ok())
                .unwrap_or_default();
            if severity < min {
                return false;
            }
        }
        true
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
