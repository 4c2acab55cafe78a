//! Runtime error types.

/// Rejections from the session registry and session service.
///
/// All variants describe caller input or resource limits; none indicate a
/// server fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The username already has a live session.
    #[error("username already logged in: {0}")]
    AlreadyExists(String),

    /// The registry holds the configured maximum number of sessions.
    #[error("session limit reached ({0})")]
    CapacityReached(usize),

    /// Presented username/token pair is not a live session.
    #[error("permission denied: invalid session")]
    PermissionDenied,
}

impl RuntimeError {
    /// Error category string for logs and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "already_exists",
            Self::CapacityReached(_) => "capacity_reached",
            Self::PermissionDenied => "permission_denied",
        }
    }
}
