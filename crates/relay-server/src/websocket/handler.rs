//! RPC frame dispatch: parses incoming text as an `RpcRequest` and routes it
//! through the `MethodRegistry`.

use tracing::{debug, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::errors::INVALID_PARAMS;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Result of handling one RPC frame.
pub struct HandleResult {
    /// Serialized JSON response to send back.
    pub response_json: String,
    /// The RPC method that was called (empty if parse failed).
    pub method: String,
    /// Typed response.
    pub response: RpcResponse,
}

fn serialize(response: &RpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        String::new()
    })
}

/// Handle an incoming RPC text frame.
#[instrument(skip_all, fields(method))]
pub async fn handle_message(message: &str, registry: &MethodRegistry, ctx: &RpcContext) -> HandleResult {
    let request: RpcRequest = match serde_json::from_str(message) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "invalid RPC frame");
            let response = RpcResponse::error("unknown", INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return HandleResult {
                response_json: serialize(&response),
                method: String::new(),
                response,
            };
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = %request.id, "dispatching RPC");

    if !registry.has_method(&method) {
        warn!(method, "unknown RPC method");
    }

    let response = registry.dispatch(request, ctx).await;
    HandleResult {
        response_json: serialize(&response),
        method,
        response,
    }
}
