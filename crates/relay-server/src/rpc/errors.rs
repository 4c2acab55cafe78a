//! RPC error type returned by handlers.

use relay_runtime::RuntimeError;

pub use relay_core::rpc::{
    INTERNAL_ERROR, INVALID_PARAMS, MAX_SESSIONS_REACHED, METHOD_NOT_FOUND, PERMISSION_DENIED,
};

use crate::rpc::types::RpcErrorBody;

/// Already-exists code, for callers that treat a taken username as an error.
pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing, wrong type or out of bounds.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Caller's username/token pair is not a live session.
    #[error("{message}")]
    PermissionDenied {
        /// Description.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Domain-specific error with arbitrary code.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<serde_json::Value>,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::PermissionDenied { .. } => PERMISSION_DENIED,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => code,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Custom { details, .. } => details.clone(),
                _ => None,
            },
        }
    }
}

impl From<RuntimeError> for RpcError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::PermissionDenied => Self::PermissionDenied {
                message: err.to_string(),
            },
            RuntimeError::CapacityReached(limit) => Self::Custom {
                code: MAX_SESSIONS_REACHED.into(),
                message: err.to_string(),
                details: Some(serde_json::json!({ "maxSessions": limit })),
            },
            RuntimeError::AlreadyExists(_) => Self::Custom {
                code: ALREADY_EXISTS.into(),
                message: err.to_string(),
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_code() {
        let err = RpcError::InvalidParams { message: "bad".into() };
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn internal_code() {
        let err = RpcError::Internal { message: "boom".into() };
        assert_eq!(err.code(), INTERNAL_ERROR);
    }

    #[test]
    fn custom_code_and_details() {
        let err = RpcError::Custom {
            code: "MY_CODE".into(),
            message: "custom".into(),
            details: Some(serde_json::json!({"x": 1})),
        };
        let body = err.to_error_body();
        assert_eq!(body.code, "MY_CODE");
        assert_eq!(body.details.unwrap()["x"], 1);
    }

    #[test]
    fn permission_denied_from_runtime() {
        let err = RpcError::from(RuntimeError::PermissionDenied);
        assert_eq!(err.code(), PERMISSION_DENIED);
        let body = err.to_error_body();
        assert!(body.message.contains("invalid session"));
        assert!(body.details.is_none());
    }

    #[test]
    fn capacity_reached_from_runtime() {
        let err = RpcError::from(RuntimeError::CapacityReached(2));
        assert_eq!(err.code(), MAX_SESSIONS_REACHED);
        assert_eq!(err.to_error_body().details.unwrap()["maxSessions"], 2);
    }

    #[test]
    fn already_exists_from_runtime() {
        let err = RpcError::from(RuntimeError::AlreadyExists("alice".into()));
        assert_eq!(err.code(), ALREADY_EXISTS);
        assert!(err.to_string().contains("alice"));
    }
}
