//! Error taxonomy
//!
//! Nothing here is fatal to the process: fetch and enforcement errors are
//! absorbed at the category-cycle boundary and surface only via
//! `ComplianceStatus`. `ConfigError` is only raised while building the agent.

use thiserror::Error;

// ============================================================================
// FETCH ERRORS
// ============================================================================

/// Failure to obtain a fresh policy snapshot. Every variant degrades the
/// cycle to the stale-cache path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    #[error("malformed policy response: {0}")]
    Malformed(String),

    /// No credentials available; the fetch was never attempted
    #[error("agent is not configured with credentials")]
    Unconfigured,
}

impl FetchError {
    /// Short reason recorded in `ComplianceStatus`
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Auth { .. } => "auth",
            FetchError::Server { .. } => "server",
            FetchError::Malformed(_) => "malformed",
            FetchError::Unconfigured => "unconfigured",
        }
    }

    /// Map a non-success HTTP status to the fetch taxonomy
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FetchError::Auth { status },
            _ => FetchError::Server { status },
        }
    }
}

// ============================================================================
// ENFORCEMENT ERRORS
// ============================================================================

/// Genuine execution failure of one enforcement action. Per-target, retried
/// on the next scheduled cycle, never affects sibling actions.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("enforcement backend unavailable: {0}")]
    Unavailable(String),

    #[error("command '{command}' failed ({exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("action timed out")]
    TimedOut,
}

impl EnforcementError {
    /// Classify an I/O error from an OS hook
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => EnforcementError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::NotFound => EnforcementError::Unavailable(err.to_string()),
            _ => EnforcementError::Io(err),
        }
    }
}

// ============================================================================
// STORE ERRORS
// ============================================================================

/// Local persistence failure (cache, device state, credentials)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("integrity check failed: {0}")]
    Integrity(String),
}

// ============================================================================
// CONFIG ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("no data directory available")]
    NoDataDir,

    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FetchError::from_status(401), FetchError::Auth { status: 401 });
        assert_eq!(FetchError::from_status(403), FetchError::Auth { status: 403 });
        assert_eq!(FetchError::from_status(503), FetchError::Server { status: 503 });
        assert_eq!(FetchError::from_status(404).reason(), "server");
    }

    #[test]
    fn test_io_classification() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(EnforcementError::from_io(denied), EnforcementError::PermissionDenied(_)));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(EnforcementError::from_io(other), EnforcementError::Io(_)));
    }
}
