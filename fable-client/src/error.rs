//! Error taxonomy for client operations.
//!
//! Every generation call returns either a payload or a classifiable
//! failure. Classification drives two policies upstream: the retry
//! executor only repeats transient failures, and the fallback chain
//! escalates permanent ones to the next provider immediately.

use thiserror::Error;

/// Errors from streaming and generation calls.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credentials rejected by provider")]
    Unauthorized,

    #[error("{label}: no providers configured")]
    Exhausted { label: String },
}

impl Error {
    /// HTTP-like status code carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure is worth retrying.
    ///
    /// Retryable: no status code (connection-level failures), 429,
    /// any 5xx, or a message indicating a network/timeout condition.
    pub fn is_retryable(&self) -> bool {
        if self.is_auth_failure() {
            return false;
        }
        match self {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Network(_) => true,
            Error::Config(_) | Error::Unauthorized | Error::Exhausted { .. } => false,
            other => {
                let message = other.to_string().to_lowercase();
                message.contains("network") || message.contains("timeout")
            }
        }
    }

    /// Whether this is a permanent credential failure (401/403).
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::Unauthorized => true,
            Error::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let too_many = Error::Api {
            status: 429,
            message: "rate limited".into(),
        };
        let server = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        let bad_request = Error::Api {
            status: 400,
            message: "bad request".into(),
        };

        assert!(too_many.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_network_errors_are_retryable() {
        assert!(Error::Network("connection reset".into()).is_retryable());
        assert!(Error::Parse("request timeout while reading body".into()).is_retryable());
        assert!(!Error::Parse("unexpected token".into()).is_retryable());
    }

    #[test]
    fn test_auth_failures_are_permanent() {
        let unauthorized = Error::Api {
            status: 401,
            message: "invalid key".into(),
        };
        assert!(unauthorized.is_auth_failure());
        assert!(!unauthorized.is_retryable());
        assert!(Error::Unauthorized.is_auth_failure());
    }

    #[test]
    fn test_status_extraction() {
        let api = Error::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(api.status(), Some(500));
        assert_eq!(Error::Network("down".into()).status(), None);
    }
}
