//! Shared context passed to every RPC handler.

use std::sync::Arc;
use std::time::Instant;

use relay_runtime::SessionService;

/// Dependencies available to RPC handlers.
pub struct RpcContext {
    /// Session and stream registries.
    pub service: Arc<SessionService>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
    /// Longest accepted username, in bytes.
    pub max_username_len: usize,
}

impl RpcContext {
    /// Context over `service` with the clock starting now.
    pub fn new(service: Arc<SessionService>, max_username_len: usize) -> Self {
        Self {
            service,
            server_start_time: Instant::now(),
            max_username_len,
        }
    }
}
