//! Request/response wire format of the `/ws` RPC socket.
//!
//! ```text
//! → {"id":"1","method":"session.login","params":{"username":"alice"}}
//! ← {"id":"1","success":true,"result":{"status":"OK","token":"…"}}
//! ← {"id":"2","success":false,"error":{"code":"PERMISSION_DENIED","message":"…"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Error codes ─────────────────────────────────────────────────────

/// Invalid or missing parameters, or a malformed request.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error (including handler timeout).
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Caller's session is not valid.
pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
/// Session limit reached.
pub const MAX_SESSIONS_REACHED: &str = "MAX_SESSIONS_REACHED";

// ── Event types ─────────────────────────────────────────────────────

/// First frame on every `/ws` socket.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Incoming RPC request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Request identifier, echoed in the response.
    pub id: String,
    /// Method name (e.g. `session.login`).
    pub method: String,
    /// Optional parameters object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Outgoing RPC response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error inside an [`RpcResponse`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable code (e.g. `PERMISSION_DENIED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Server-pushed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcEvent {
    /// Event type (e.g. `connection.established`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 timestamp, millisecond precision.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcEvent {
    /// Create an event stamped with the current UTC time.
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_params() {
        let req: RpcRequest = serde_json::from_str(r#"{"id":"1","method":"system.ping"}"#).unwrap();
        assert_eq!(req.method, "system.ping");
        assert!(req.params.is_none());

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("params").is_none());
    }

    #[test]
    fn request_missing_method_fails() {
        assert!(serde_json::from_str::<RpcRequest>(r#"{"id":"1"}"#).is_err());
    }

    #[test]
    fn success_response_shape() {
        let resp = RpcResponse::success("r1", json!({"status": "OK"}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], "r1");
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["status"], "OK");
        assert!(json.get("error").is_none());
        assert_eq!(resp.error_code(), None);
    }

    #[test]
    fn error_response_shape() {
        let resp = RpcResponse::error("r2", PERMISSION_DENIED, "invalid session");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "PERMISSION_DENIED");
        assert!(json.get("result").is_none());
        assert!(json["error"].get("details").is_none());
        assert_eq!(resp.error_code(), Some(PERMISSION_DENIED));
    }

    #[test]
    fn event_shape() {
        let event = RpcEvent::new(CONNECTION_ESTABLISHED, Some(json!({"clientId": "c1"})));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection.established");
        assert_eq!(json["data"]["clientId"], "c1");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }
}
