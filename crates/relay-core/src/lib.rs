//! # relay-core
//!
//! Foundation types shared by every relay crate.
//!
//! - **Branded IDs**: [`SessionToken`] and [`ConnectionId`] as newtypes so a
//!   connection ID can never be passed where a session token is expected
//! - **Chat frames**: [`ClientMessage`] (client → server) and
//!   [`RelayedMessage`] (server → client) as they travel on the chat stream
//! - **Close reasons**: [`CloseReason`], the vocabulary used to terminate a
//!   stream and the WebSocket close code each reason maps to
//! - **RPC wire types**: [`rpc::RpcRequest`], [`rpc::RpcResponse`] and the
//!   error codes shared by server and client

#![deny(unsafe_code)]

pub mod close;
pub mod ids;
pub mod messages;
pub mod rpc;

pub use close::CloseReason;
pub use ids::{ConnectionId, SessionToken};
pub use messages::{ClientMessage, MessageError, RelayedMessage};
