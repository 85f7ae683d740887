//! Input simulation handlers.
//!
//! Each event goes to the game process when a debugger session is active,
//! otherwise to the editor host.

use async_trait::async_trait;
use codot_core::input::{ActionInput, InputEvent, KeyInput, MouseButtonInput, MouseMotionInput};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::require_string_param;
use crate::registry::MethodHandler;

fn parse_input<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid(format!("Invalid input parameters: {e}")))
}

fn route(event: &InputEvent, ctx: &RpcContext) -> Result<Value, RpcError> {
    let routing = ctx.bridge.route_input(event, ctx.host.as_ref())?;
    Ok(json!({
        "routed_to_game": routing.routed_to_game,
        "input_type": routing.input_type,
        "event": event,
    }))
}

/// Key press or release.
pub struct SimulateKeyHandler;

#[async_trait]
impl MethodHandler for SimulateKeyHandler {
    #[instrument(skip(self, ctx), fields(method = "simulate_key"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let _ = require_string_param(&params, "key")?;
        let key: KeyInput = parse_input(params)?;
        route(&InputEvent::Key(key), ctx)
    }
}

/// Mouse button press or release.
pub struct SimulateMouseButtonHandler;

#[async_trait]
impl MethodHandler for SimulateMouseButtonHandler {
    #[instrument(skip(self, ctx), fields(method = "simulate_mouse_button"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let button: MouseButtonInput = parse_input(params)?;
        if button.button == 0 {
            return Err(RpcError::invalid("Parameter 'button' must be at least 1"));
        }
        route(&InputEvent::MouseButton(button), ctx)
    }
}

/// Mouse movement.
pub struct SimulateMouseMotionHandler;

#[async_trait]
impl MethodHandler for SimulateMouseMotionHandler {
    #[instrument(skip(self, ctx), fields(method = "simulate_mouse_motion"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let motion: MouseMotionInput = parse_input(params)?;
        route(&InputEvent::MouseMotion(motion), ctx)
    }
}

/// Input-map action.
pub struct SimulateActionHandler;

#[async_trait]
impl MethodHandler for SimulateActionHandler {
    #[instrument(skip(self, ctx), fields(method = "simulate_action"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let _ = require_string_param(&params, "action")?;
        let action: ActionInput = parse_input(params)?;
        if !(0.0..=1.0).contains(&action.strength) {
            return Err(RpcError::invalid("Parameter 'strength' must be between 0.0 and 1.0"));
        }
        route(&InputEvent::Action(action), ctx)
    }
}
