//! Request/response RPC over the `/ws` socket.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod validation;

pub use relay_core::rpc as types;
