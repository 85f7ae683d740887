//! Command handler modules and registration.

pub mod debugger;
pub mod events;
pub mod input;
pub mod system;

use std::time::Duration;

use serde_json::Value;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// Upper bound for any seconds-valued wait parameter.
pub(crate) const MAX_WAIT_SECS: f64 = 120.0;

/// Register all built-in command handlers with the registry.
///
/// `get_status` is registered last so its command list covers everything
/// registered before it.
pub fn register_all(registry: &mut MethodRegistry) {
    // Core
    registry.register("ping", system::PingHandler);

    // Events
    registry.register("subscribe", events::SubscribeHandler);
    registry.register("unsubscribe", events::UnsubscribeHandler);
    registry.register("poll_events", events::PollEventsHandler);
    registry.register("get_subscriptions", events::GetSubscriptionsHandler);
    registry.register("get_subscription_stats", events::GetSubscriptionStatsHandler);
    registry.register("publish_event", events::PublishEventHandler);
    registry.register("get_event_types", events::GetEventTypesHandler);

    // Debugger
    registry.register("get_debug_output", debugger::GetDebugOutputHandler);
    registry.register("clear_debug_log", debugger::ClearDebugLogHandler);
    registry.register("get_debugger_status", debugger::GetDebuggerStatusHandler);
    registry.register("ping_game", debugger::PingGameHandler);
    registry.register("get_game_state", debugger::GetGameStateHandler);
    registry.register("take_screenshot", debugger::TakeScreenshotHandler);
    registry.register("run_and_capture", debugger::RunAndCaptureHandler);
    registry.register("wait_for_output", debugger::WaitForOutputHandler);

    // Input
    registry.register("simulate_key", input::SimulateKeyHandler);
    registry.register("simulate_mouse_button", input::SimulateMouseButtonHandler);
    registry.register("simulate_mouse_motion", input::SimulateMouseMotionHandler);
    registry.register("simulate_action", input::SimulateActionHandler);

    let mut commands = registry.methods();
    commands.push("get_status".to_owned());
    commands.sort();
    registry.register("get_status", system::GetStatusHandler::new(commands));
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(params: &'a Value, key: &str) -> Result<&'a Value, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(RpcError::missing(key)),
        Some(value) => Ok(value),
    }
}

/// Extract a required non-empty string parameter.
pub(crate) fn require_string_param(params: &Value, key: &str) -> Result<String, RpcError> {
    let value = require_param(params, key)?
        .as_str()
        .ok_or_else(|| RpcError::invalid(format!("Parameter '{key}' must be a string")))?;
    if value.is_empty() {
        return Err(RpcError::missing(key));
    }
    Ok(value.to_owned())
}

/// Optional string parameter.
pub(crate) fn opt_string_param(params: &Value, key: &str) -> Result<Option<String>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RpcError::invalid(format!("Parameter '{key}' must be a string"))),
    }
}

/// Optional boolean parameter.
pub(crate) fn opt_bool_param(params: &Value, key: &str, default: bool) -> Result<bool, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(RpcError::invalid(format!("Parameter '{key}' must be a boolean"))),
    }
}

/// Optional non-negative integer parameter.
pub(crate) fn opt_u64_param(params: &Value, key: &str, default: u64) -> Result<u64, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| RpcError::invalid(format!("Parameter '{key}' must be a non-negative integer"))),
    }
}

/// Optional count parameter that must be at least 1.
pub(crate) fn opt_count_param(params: &Value, key: &str, default: usize) -> Result<usize, RpcError> {
    let n = opt_u64_param(params, key, default as u64)?;
    if n == 0 {
        return Err(RpcError::invalid(format!("Parameter '{key}' must be at least 1")));
    }
    usize::try_from(n).map_err(|_| RpcError::invalid(format!("Parameter '{key}' is too large")))
}

/// Optional duration given in (fractional) seconds, bounded by
/// [`MAX_WAIT_SECS`].
pub(crate) fn opt_seconds_param(params: &Value, key: &str, default: f64) -> Result<Duration, RpcError> {
    let secs = match params.get(key) {
        None | Some(Value::Null) => default,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| RpcError::invalid(format!("Parameter '{key}' must be a number of seconds")))?,
    };
    if !secs.is_finite() || secs < 0.0 || secs > MAX_WAIT_SECS {
        return Err(RpcError::invalid(format!(
            "Parameter '{key}' must be between 0 and {MAX_WAIT_SECS} seconds"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Resolve `client_id`, defaulting to the calling connection's id.
pub(crate) fn client_id_param(params: &Value, ctx: &RpcContext) -> Result<String, RpcError> {
    match opt_string_param(params, "client_id")? {
        Some(id) if !id.is_empty() => Ok(id),
        _ => ctx
            .connection_id
            .map(|c| c.to_string())
            .ok_or_else(|| RpcError::missing("client_id")),
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::context::RpcContext;

    /// Build an `RpcContext` with fresh state and no editor attached.
    pub fn make_test_context() -> RpcContext {
        RpcContext::default()
    }
}
