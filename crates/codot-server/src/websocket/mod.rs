//! WebSocket connection management, heartbeat, and frame dispatch.

pub mod connection;
pub mod game;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;
