//! # relay-server
//!
//! Axum HTTP + `WebSocket` transport for the chat relay.
//!
//! - `/ws`: request/response RPC (`session.login`, `session.logout`,
//!   `session.listUsers`, `system.*`) dispatched through a [`MethodRegistry`]
//! - `/chat`: the bidirectional chat stream, one [`ChatChannel`] per socket
//! - `/health` and `/metrics` (Prometheus text)
//! - Heartbeat ping/pong, connection limit, graceful shutdown via
//!   `CancellationToken`
//!
//! [`MethodRegistry`]: rpc::registry::MethodRegistry
//! [`ChatChannel`]: relay_runtime::ChatChannel

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::RelayServer;
