//! # relay-client
//!
//! Client for the relay chat server.
//!
//! [`ChatClient`] drives the two sockets a chat participant needs: the `/ws`
//! RPC socket for `session.login`, `session.logout` and `session.listUsers`,
//! and, once logged in, the `/chat` stream that carries outgoing
//! [`ClientMessage`](relay_core::ClientMessage)s and incoming
//! [`RelayedMessage`](relay_core::RelayedMessage)s.

#![deny(unsafe_code)]

pub mod client;
pub mod error;

pub use client::{ChatClient, ChatEvent, join_announcement};
pub use error::RpcFailure;
