//! Event bus errors.

use thiserror::Error;

/// Errors returned by [`EventBus`](crate::EventBus) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// The event type is not one of the recognized values.
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    /// The client has no subscription for this event type.
    #[error("Client '{client_id}' is not subscribed to {event_type}")]
    NotSubscribed {
        /// Subscriber key.
        client_id: String,
        /// Event type name.
        event_type: String,
    },

    /// The filter object is malformed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl EventBusError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEventType(_) => "INVALID_EVENT_TYPE",
            Self::NotSubscribed { .. } => "NOT_SUBSCRIBED",
            Self::InvalidFilter(_) => "INVALID_FILTER",
        }
    }
}
