//! The fixed set of editor event types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EventBusError;

/// Editor event type. The snake-case names are a wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// `{path}`
    SceneChanged,
    /// `{path, node_type, parent?}`
    NodeAdded,
    /// `{path, node_type?}`
    NodeRemoved,
    /// `{path, old_name, new_name}`
    NodeRenamed,
    /// `{path, property, value?}`
    PropertyChanged,
    /// `{path, line?, message, severity}`
    ScriptError,
    /// `{scene?}`
    GameStarted,
    /// `{}`
    GameStopped,
    /// `{paused}`
    GamePaused,
    /// `{path, change?}`
    FileChanged,
    /// `{paths}`
    SelectionChanged,
    /// `{message, severity}`
    DebugOutput,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::SceneChanged,
        Self::NodeAdded,
        Self::NodeRemoved,
        Self::NodeRenamed,
        Self::PropertyChanged,
        Self::ScriptError,
        Self::GameStarted,
        Self::GameStopped,
        Self::GamePaused,
        Self::FileChanged,
        Self::SelectionChanged,
        Self::DebugOutput,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SceneChanged => "scene_changed",
            Self::NodeAdded => "node_added",
            Self::NodeRemoved => "node_removed",
            Self::NodeRenamed => "node_renamed",
            Self::PropertyChanged => "property_changed",
            Self::ScriptError => "script_error",
            Self::GameStarted => "game_started",
            Self::GameStopped => "game_stopped",
            Self::GamePaused => "game_paused",
            Self::FileChanged => "file_changed",
            Self::SelectionChanged => "selection_changed",
            Self::DebugOutput => "debug_output",
        }
    }

    /// Payload keys documented for this type; optional keys end in `?`.
    pub fn payload_fields(self) -> &'static [&'static str] {
        match self {
            Self::SceneChanged => &["path"],
            Self::NodeAdded => &["path", "node_type", "parent?"],
            Self::NodeRemoved => &["path", "node_type?"],
            Self::NodeRenamed => &["path", "old_name", "new_name"],
            Self::PropertyChanged => &["path", "property", "value?"],
            Self::ScriptError => &["path", "line?", "message", "severity"],
            Self::GameStarted => &["scene?"],
            Self::GameStopped => &[],
            Self::GamePaused => &["paused"],
            Self::FileChanged => &["path", "change?"],
            Self::SelectionChanged => &["paths"],
            Self::DebugOutput => &["message", "severity"],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventBusError::InvalidEventType(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_every_type() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
    }

    #[test]
    fn parse_rejects_unknown_and_case_variants() {
        assert!("scene_loaded".parse::<EventType>().is_err());
        let err = "SCENE_CHANGED".parse::<EventType>().unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT_TYPE");
    }

    #[test]
    fn serde_matches_as_str() {
        for t in EventType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, t.as_str());
        }
    }

    #[test]
    fn payload_fields_documented() {
        assert_eq!(EventType::GameStopped.payload_fields().len(), 0);
        assert!(EventType::ScriptError.payload_fields().contains(&"severity"));
    }
}
