//! Synthesized input events.
//!
//! The same event value is either forwarded to the running game process or
//! applied to the editor's own input queue; the two queues are independent.

use serde::{Deserialize, Serialize};

/// A keyboard key press or release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyInput {
    /// Key name (`W`, `SPACE`, `ENTER`, `F1`, ...).
    pub key: String,
    /// `true` for press, `false` for release.
    pub pressed: bool,
    /// Held-key repeat.
    pub echo: bool,
    /// Shift modifier.
    pub shift: bool,
    /// Ctrl modifier.
    pub ctrl: bool,
    /// Alt modifier.
    pub alt: bool,
    /// Meta/Cmd/Win modifier.
    pub meta: bool,
}

impl Default for KeyInput {
    fn default() -> Self {
        Self {
            key: String::new(),
            pressed: true,
            echo: false,
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        }
    }
}

/// A mouse button press or release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseButtonInput {
    /// 1 = left, 2 = right, 3 = middle, 4 = wheel up, 5 = wheel down.
    pub button: u8,
    /// `true` for press, `false` for release.
    pub pressed: bool,
    /// X position in pixels.
    pub x: f64,
    /// Y position in pixels.
    pub y: f64,
    /// Double-click flag.
    pub double_click: bool,
}

impl Default for MouseButtonInput {
    fn default() -> Self {
        Self {
            button: 1,
            pressed: true,
            x: 0.0,
            y: 0.0,
            double_click: false,
        }
    }
}

/// Mouse movement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseMotionInput {
    /// Absolute X position.
    pub x: f64,
    /// Absolute Y position.
    pub y: f64,
    /// Relative X movement.
    pub relative_x: f64,
    /// Relative Y movement.
    pub relative_y: f64,
    /// Bitmask of held buttons.
    pub button_mask: u32,
}

/// A named input-map action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionInput {
    /// Action name (`ui_accept`, `jump`, ...).
    pub action: String,
    /// `true` for pressed, `false` for released.
    pub pressed: bool,
    /// Analog strength in `0.0..=1.0`.
    pub strength: f64,
}

impl Default for ActionInput {
    fn default() -> Self {
        Self {
            action: String::new(),
            pressed: true,
            strength: 1.0,
        }
    }
}

/// Any synthesized input event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Keyboard.
    Key(KeyInput),
    /// Mouse button.
    MouseButton(MouseButtonInput),
    /// Mouse motion.
    MouseMotion(MouseMotionInput),
    /// Input-map action.
    Action(ActionInput),
}

impl InputEvent {
    /// Short wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::MouseButton(_) => "mouse_button",
            Self::MouseMotion(_) => "mouse_motion",
            Self::Action(_) => "action",
        }
    }
}
