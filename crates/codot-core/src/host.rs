//! Editor capability interface.
//!
//! Handlers never talk to the editor directly. They go through an
//! [`EditorHost`] resolved once at construction; every method has a no-op
//! default so a partial host only implements what it supports. [`NullHost`]
//! is used when no editor is attached.

use crate::input::InputEvent;

/// Failure reported by an [`EditorHost`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// No editor is attached.
    #[error("editor is not available")]
    Unavailable,

    /// The host does not implement this operation.
    #[error("operation not supported by host: {0}")]
    Unsupported(&'static str),

    /// The requested scene does not exist.
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    /// The host attempted the operation and it failed.
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "NO_EDITOR",
            Self::Unsupported(_) => "NOT_SUPPORTED",
            Self::SceneNotFound(_) => "SCENE_NOT_FOUND",
            Self::Failed(_) => "HOST_ERROR",
        }
    }
}

/// Capabilities the protocol layer needs from the editor.
pub trait EditorHost: Send + Sync {
    /// Whether an editor is attached at all.
    fn is_available(&self) -> bool {
        false
    }

    /// Editor version string, when known.
    fn editor_version(&self) -> Option<String> {
        None
    }

    /// Start playing `scene`, or the main scene when `None`.
    fn play(&self, scene: Option<String>) -> Result<(), HostError> {
        let _ = scene;
        Err(HostError::Unsupported("play"))
    }

    /// Stop the running game.
    fn stop(&self) -> Result<(), HostError> {
        Err(HostError::Unsupported("stop"))
    }

    /// Whether a game is currently running.
    fn is_playing(&self) -> bool {
        false
    }

    /// Apply an input event to the editor's own input queue.
    fn inject_input(&self, event: &InputEvent) -> Result<(), HostError> {
        let _ = event;
        Err(HostError::Unsupported("inject_input"))
    }
}

/// Host used when no editor is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl EditorHost for NullHost {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ActionInput, InputEvent};

    #[test]
    fn null_host_reports_unavailable() {
        let host = NullHost;
        assert!(!host.is_available());
        assert!(!host.is_playing());
        assert!(host.editor_version().is_none());
    }

    #[test]
    fn null_host_rejects_operations() {
        let host = NullHost;
        let err = host.play(None).unwrap_err();
        assert_eq!(err.code(), "NOT_SUPPORTED");
        let ev = InputEvent::Action(ActionInput::default());
        assert!(host.inject_input(&ev).is_err());
    }

    #[test]
    fn error_codes() {
        assert_eq!(HostError::Unavailable.code(), "NO_EDITOR");
        assert_eq!(HostError::SceneNotFound("res://a.tscn".into()).code(), "SCENE_NOT_FOUND");
        assert_eq!(HostError::Failed("boom".into()).to_string(), "boom");
    }

    mockall::mock! {
        Host {}
        impl EditorHost for Host {
            fn is_available(&self) -> bool;
            fn is_playing(&self) -> bool;
            fn play(&self, scene: Option<String>) -> Result<(), HostError>;
        }
    }

    #[test]
    fn partial_host_keeps_defaults() {
        let mut host = MockHost::new();
        let _ = host.expect_is_available().return_const(true);
        let _ = host
            .expect_play()
            .withf(|scene| scene.as_deref() == Some("res://main.tscn"))
            .times(1)
            .returning(|_| Ok(()));
        assert!(host.is_available());
        host.play(Some("res://main.tscn".into())).unwrap();
        assert!(host.stop().is_err());
    }
}
