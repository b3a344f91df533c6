//! # pairpad-server — realtime backend for the pairpad editor
//!
//! Serves both realtime channels of a room from one WebSocket listener:
//! document sync and presence through [`pairpad_collab::DocumentHub`], and
//! the shared terminal through [`pairpad_exec::ExecutionManager`].
//!
//! ## Modules
//!
//! - [`config`] — server configuration
//! - [`registry`] — which rooms may be joined
//! - [`gateway`] — accept loop, handshake routing, per-connection loops

pub mod config;
pub mod registry;
pub mod gateway;

pub use config::ServerConfig;
pub use registry::{OpenRegistry, RoomRegistry, StaticRegistry};
pub use gateway::{Gateway, GatewayError, EXEC_PATH};
