//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider refused the credentials or code
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The backend answered with an error status
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// No session
    #[error("Not logged in")]
    NotLoggedIn,

    /// A magic-link code arrived but no verifier is stored for it
    #[error("No pending sign-in for this link")]
    MissingCodeVerifier,

    /// Invalid state transition in the callback FSM
    #[error("Invalid callback state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] hapien_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - HTTP errors with 5xx status codes
    /// - Connection timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Returns true if the backend answered and said no, as opposed to the
    /// request never completing.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::Rejected(_) | AuthError::InvalidCredentials(_)
        )
    }

    /// The provider's own wording when it supplied one, otherwise the
    /// rendered error.
    pub fn provider_message(&self) -> String {
        match self {
            AuthError::Rejected(msg)
            | AuthError::InvalidCredentials(msg)
            | AuthError::TokenRefresh(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network_unavailable() {
        assert!(AuthError::NetworkUnavailable.is_transient());
    }

    #[test]
    fn test_is_transient_timeout() {
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_is_not_transient_rejected() {
        assert!(!AuthError::Rejected("409".to_string()).is_transient());
    }

    #[test]
    fn test_is_not_transient_refresh_exhausted() {
        assert!(!AuthError::RefreshExhausted(3).is_transient());
    }

    #[test]
    fn test_rejection_classification() {
        assert!(AuthError::Rejected("403".to_string()).is_rejection());
        assert!(AuthError::InvalidCredentials("bad code".to_string()).is_rejection());
        assert!(!AuthError::NetworkUnavailable.is_rejection());
        assert!(!AuthError::Config("missing url".to_string()).is_rejection());
    }

    #[test]
    fn test_provider_message_is_verbatim() {
        assert_eq!(
            AuthError::InvalidCredentials("Flow state has expired".to_string()).provider_message(),
            "Flow state has expired"
        );
        assert_eq!(AuthError::NotLoggedIn.provider_message(), "Not logged in");
    }
}
