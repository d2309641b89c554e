//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
///
/// `Clone` so that every caller waiting on a shared refresh observes the
/// same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Backend rejected the credentials (login, register or refresh).
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No refresh token to exchange.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Operation requires a session.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Original `401` surfaced after the session could not be recovered.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// `401` on the retried request after a successful refresh.
    #[error("Request still unauthorized after token refresh")]
    RetryExhausted,

    /// A refresh finished after the session was cleared or replaced.
    #[error("Session was cleared while the token refresh was in flight")]
    SessionCleared,

    /// Any other non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure (connect, DNS, reset, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout.
    #[error("Request timed out")]
    Timeout,

    /// Response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the caller may offer a retry.
    ///
    /// Transient errors include network failures, timeouts and 5xx responses.
    /// None of them ever trigger a token refresh.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) | AuthError::Timeout => true,
            AuthError::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns true if the session is gone and the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthorized(_)
                | AuthError::NoRefreshToken
                | AuthError::NotLoggedIn
                | AuthError::SessionCleared
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Status { status, .. } => Some(*status),
            AuthError::Unauthorized(_) | AuthError::RetryExhausted => Some(401),
            _ => None,
        }
    }
}

impl From<session_storage::StorageError> for AuthError {
    fn from(err: session_storage::StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::MalformedResponse(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::Config(format!("Invalid URL: {}", err))
    }
}

impl From<khotruyen_config::CoreError> for AuthError {
    fn from(err: khotruyen_config::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network() {
        assert!(AuthError::Network("connection reset".to_string()).is_transient());
    }

    #[test]
    fn test_is_transient_timeout() {
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_is_transient_server_error() {
        let err = AuthError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        let err = AuthError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_transient());
        assert!(!AuthError::InvalidCredentials("bad password".to_string()).is_transient());
        assert!(!AuthError::RetryExhausted.is_transient());
        assert!(!AuthError::NoRefreshToken.is_transient());
    }

    #[test]
    fn test_requires_login() {
        assert!(AuthError::Unauthorized("expired".to_string()).requires_login());
        assert!(AuthError::NoRefreshToken.requires_login());
        assert!(!AuthError::Timeout.requires_login());
        assert!(!AuthError::RetryExhausted.requires_login());
    }

    #[test]
    fn test_status() {
        assert_eq!(AuthError::RetryExhausted.status(), Some(401));
        assert_eq!(
            AuthError::Status {
                status: 422,
                body: String::new()
            }
            .status(),
            Some(422)
        );
        assert_eq!(AuthError::Timeout.status(), None);
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: AuthError = session_storage::StorageError::Backend("locked".to_string()).into();
        assert!(matches!(err, AuthError::Storage(msg) if msg.contains("locked")));
    }
}
