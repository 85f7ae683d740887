//! # codot-core
//!
//! Types shared by every Codot crate:
//! - [`ids`]: connection and debugger-session identifiers
//! - [`host`]: the editor capability interface handlers run against
//! - [`input`]: synthesized keyboard/mouse/action events
//! - [`logging`]: `tracing` subscriber bootstrap
//! - [`time`]: wall-clock helpers used on the wire

#![deny(unsafe_code)]

pub mod host;
pub mod ids;
pub mod input;
pub mod logging;
pub mod time;

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 6850;
