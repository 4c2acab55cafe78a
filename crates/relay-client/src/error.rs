//! Client-side error types.

/// The server answered an RPC with an error body.
///
/// Returned inside `anyhow::Error`; callers that care about the code can
/// `downcast_ref::<RpcFailure>()`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{method} failed with {code}: {message}")]
pub struct RpcFailure {
    /// Method that was called.
    pub method: String,
    /// Machine-readable error code (e.g. `PERMISSION_DENIED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = RpcFailure {
            method: "session.listUsers".into(),
            code: "PERMISSION_DENIED".into(),
            message: "Invalid session".into(),
        };
        assert_eq!(
            err.to_string(),
            "session.listUsers failed with PERMISSION_DENIED: Invalid session"
        );
    }

    #[test]
    fn survives_anyhow_round_trip() {
        let err = anyhow::Error::new(RpcFailure {
            method: "session.login".into(),
            code: "MAX_SESSIONS_REACHED".into(),
            message: "full".into(),
        });
        let failure = err.downcast_ref::<RpcFailure>().unwrap();
        assert_eq!(failure.code, "MAX_SESSIONS_REACHED");
    }
}
