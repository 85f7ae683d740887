//! Debugger bridge errors.

use codot_core::host::HostError;
use thiserror::Error;

/// Errors returned by bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    /// No game process is connected.
    #[error("No active debugger session (is the game running with the capture system enabled?)")]
    NoSession,

    /// The session's channel is closed.
    #[error("Debugger session {0} is no longer active")]
    SessionInactive(String),

    /// A request argument was invalid.
    #[error("{0}")]
    InvalidArgument(String),

    /// The editor host refused or failed the operation.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl DebuggerError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSession => "NO_SESSION",
            Self::SessionInactive(_) => "SESSION_INACTIVE",
            Self::InvalidArgument(_) => "INVALID_PARAMS",
            Self::Host(err) => err.code(),
        }
    }
}
