//! # relay-runtime
//!
//! Session and broadcast core of the relay chat server. Transport-agnostic:
//! the server crate feeds it decoded frames and drains each connection's
//! sink.
//!
//! - [`SessionRegistry`]: username → current token
//! - [`StreamRegistry`]: token → open chat stream sink, plus fan-out
//! - [`SessionService`]: login / logout / list users over both registries
//! - [`ChatChannel`]: per-stream `Unbound → Bound → Closed` state machine
//! - [`ClientSink`]: bounded, non-blocking outbound queue of one connection

#![deny(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod service;
pub mod sessions;
pub mod sink;
pub mod streams;

pub use channel::{ChannelError, ChannelState, ChatChannel};
pub use errors::RuntimeError;
pub use service::{LoginOutcome, LogoutOutcome, SessionService, Status};
pub use sessions::{ActiveSession, Removal, SessionRegistry};
pub use sink::ClientSink;
pub use streams::{BroadcastReport, MAX_TOTAL_DROPS, StreamRegistry};
