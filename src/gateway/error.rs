//! Errors returned by table store calls.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the table store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            429 => GatewayError::RateLimited { retry_after },
            401 | 403 => GatewayError::Auth(message),
            404 => GatewayError::RecordNotFound(message),
            s if s >= 500 => GatewayError::Server { status: s, message },
            s => GatewayError::Rejected { status: s, message },
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GatewayError::RateLimited { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::RateLimited { .. } => true,
            GatewayError::Network(_) => true,
            GatewayError::Server { .. } => true,
            GatewayError::Auth(_) => false,
            GatewayError::Rejected { .. } => false,
            GatewayError::RecordNotFound(_) => false,
            GatewayError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::from_status(status.as_u16(), err.to_string(), None)
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// A gateway call that gave up, with the number of attempts it made
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error} (after {attempts} attempts)")]
pub struct GatewayFailure {
    pub attempts: u32,
    pub error: GatewayError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(GatewayError::from_status(429, "slow down", None).is_rate_limit());
        assert!(GatewayError::from_status(401, "bad token", None).is_auth());
        assert!(GatewayError::from_status(403, "forbidden", None).is_auth());
        assert!(matches!(
            GatewayError::from_status(404, "gone", None),
            GatewayError::RecordNotFound(_)
        ));
        assert!(matches!(
            GatewayError::from_status(503, "unavailable", None),
            GatewayError::Server { status: 503, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(400, "bad field", None),
            GatewayError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_is_transient() {
        assert!(GatewayError::RateLimited { retry_after: None }.is_transient());
        assert!(GatewayError::Network("reset".to_string()).is_transient());
        assert!(
            GatewayError::Server {
                status: 502,
                message: "bad gateway".to_string()
            }
            .is_transient()
        );
        assert!(!GatewayError::Auth("expired".to_string()).is_transient());
        assert!(
            !GatewayError::Rejected {
                status: 400,
                message: "bad request".to_string()
            }
            .is_transient()
        );
        assert!(!GatewayError::RecordNotFound("rec1".to_string()).is_transient());
        assert!(!GatewayError::InvalidResponse("not json".to_string()).is_transient());
    }

    #[test]
    fn test_retry_after_is_kept() {
        let err = GatewayError::from_status(429, "", Some(Duration::from_secs(2)));
        assert_eq!(
            err,
            GatewayError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn test_failure_display() {
        let failure = GatewayFailure {
            attempts: 4,
            error: GatewayError::Network("connection reset".to_string()),
        };
        assert_eq!(failure.to_string(), "Network error: connection reset (after 4 attempts)");
    }
}
