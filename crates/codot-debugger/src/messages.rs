//! Session-channel message tags and frame shape.
//!
//! The tag strings round-trip with the instrumented game process and must not
//! change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Liveness probe, bridge to game.
pub const PING: &str = "codot:ping";
/// Liveness reply, game to bridge.
pub const PONG: &str = "codot:pong";
/// Screenshot request, bridge to game. Data: `{path}`.
pub const SCREENSHOT: &str = "codot:screenshot";
/// Screenshot done, game to bridge. Data: `{path}`.
pub const SCREENSHOT_TAKEN: &str = "codot:screenshot_taken";
/// Test run finished, game to bridge. Data: free-form result object.
pub const TEST_COMPLETE: &str = "codot:test_complete";
/// Capture system initialized in the game process.
pub const READY: &str = "codot:ready";
/// Structured log entry: `{type, message, source?}`.
pub const ENTRY: &str = "codot:entry";
/// Plain printed output: a string or `{message, type?}`.
pub const OUTPUT: &str = "codot:output";
/// Synthesized input event, bridge to game.
pub const INPUT: &str = "codot:input";

/// One frame on the game endpoint: `{"message": <tag>, "data": <any>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameMessage {
    /// Message tag.
    pub message: String,
    /// Tag-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl GameMessage {
    /// Build a frame.
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}
