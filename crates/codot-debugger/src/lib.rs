//! # codot-debugger
//!
//! Bridge between the protocol layer and a separately running, instrumented
//! game process.
//!
//! The game connects as a session and streams tagged messages (see
//! [`messages`]). The [`DebuggerBridge`] keeps an append-only output log with
//! strictly increasing ids so clients can page through it incrementally with
//! a `since_id` watermark. It also forwards synthesized input and probes
//! liveness with ping/pong. [`capture::run_and_capture`] plays a scene and
//! summarizes the output it produced.

#![deny(unsafe_code)]

pub mod bridge;
pub mod capture;
pub mod errors;
pub mod log;
pub mod messages;
pub mod session;

pub use bridge::{DebuggerBridge, DebuggerStatus, EntriesPage, InputRouting, PingResult, ScreenshotResult, WaitResult, WaitTarget};
pub use capture::{CaptureRequest, CaptureSummary, RunPhase, run_and_capture};
pub use errors::DebuggerError;
pub use log::{EntryFilter, LogEntry, LogEntryType};
pub use messages::GameMessage;
pub use session::{SessionChannel, SessionInfo};

/// Default number of retained log entries.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
