//! Input validation helpers for RPC parameters.

use super::errors::RpcError;

/// Maximum length of a session token parameter.
pub const MAX_TOKEN_LENGTH: usize = 128;

/// Validate that a string parameter does not exceed `max_len` bytes.
pub fn validate_string_param(value: &str, name: &str, max_len: usize) -> Result<(), RpcError> {
    if value.len() > max_len {
        return Err(RpcError::InvalidParams {
            message: format!(
                "Parameter '{name}' exceeds maximum length ({} > {max_len})",
                value.len()
            ),
        });
    }
    Ok(())
}

/// Validate a username: non-empty and at most `max_len` bytes.
///
/// Usernames are otherwise opaque; no trimming or case folding.
pub fn validate_username(value: &str, max_len: usize) -> Result<(), RpcError> {
    if value.is_empty() {
        return Err(RpcError::InvalidParams {
            message: "Parameter 'username' must not be empty".into(),
        });
    }
    validate_string_param(value, "username", max_len)
}

/// Sanitize an error message for client consumption.
///
/// Internal errors are replaced with a generic message.
pub fn sanitize_error_message(err: &RpcError) -> String {
    match err {
        RpcError::InvalidParams { message }
        | RpcError::PermissionDenied { message }
        | RpcError::Custom { message, .. } => message.clone(),
        RpcError::Internal { .. } => "Internal error".to_string(),
    }
}
