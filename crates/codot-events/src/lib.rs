//! # codot-events
//!
//! Editor event pub/sub for Codot clients.
//!
//! Clients subscribe to one of the fixed [`EventType`]s with an optional
//! [`EventFilter`]. Published events land in a single bounded queue shared by
//! every subscriber; clients drain it with [`EventBus::poll`]. Subscriptions
//! created with `push` over a live connection are also delivered immediately
//! through the installed [`EventSink`].

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod event_type;
pub mod filter;

pub use bus::{Event, EventBus, EventSink, SubscribeOptions, SubscriptionInfo, SubscriptionStats};
pub use errors::EventBusError;
pub use event_type::EventType;
pub use filter::{EventFilter, Severity};

/// Default capacity of the shared event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
