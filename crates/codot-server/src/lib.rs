//! # codot-server
//!
//! Axum HTTP + `WebSocket` transport for the Codot command protocol.
//!
//! - `/` and `/ws`: client connections, one JSON command per text frame
//! - `/game`: the instrumented game process, bridged into the debugger
//! - `/health`: liveness and connection counts
//! - Connection registry with push delivery for event subscriptions
//! - Heartbeat, connection limits, and graceful shutdown via
//!   `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{CodotServer, ServerError};
pub use shutdown::ShutdownCoordinator;
pub use websocket::registry::{ConnectionRegistry, DisconnectHook, DisconnectReason, SendStatus};
