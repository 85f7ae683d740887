//! # codot-rpc
//!
//! Command protocol layer for Codot.
//!
//! - [`types`]: request/response envelopes and the pushed-event frame
//! - [`registry`]: [`MethodHandler`](registry::MethodHandler) trait and the
//!   name-to-handler dispatcher
//! - [`batch`]: `batch_commands`, sequential compound execution
//! - [`handlers`]: core, event bus, debugger and input commands
//!
//! Domain commands live outside this crate and plug in by implementing
//! `MethodHandler` and registering under a name.

#![deny(unsafe_code)]

pub mod batch;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use registry::{MethodHandler, MethodRegistry};
pub use types::{EventNotification, RpcErrorBody, RpcRequest, RpcResponse};
