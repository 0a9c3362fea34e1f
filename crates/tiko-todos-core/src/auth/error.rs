use thiserror::Error;

use crate::api::ApiError;

/// Local input problems detected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error("{field} must be at most {max} characters long")]
    NameTooLong { field: &'static str, max: usize },

    #[error("Todo description cannot be empty")]
    EmptyDescription,
}

#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Not logged in")]
    Unauthenticated,

    #[error("Secure storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Api(ApiError),
}

impl AuthError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain on one line
        AuthError::Storage(format!("{:#}", err))
    }

    /// Both `Unauthenticated` and `SessionExpired` mean the user has to log in.
    pub fn requires_login(&self) -> bool {
        matches!(self, AuthError::Unauthenticated | AuthError::SessionExpired)
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Timeout => AuthError::Network("request timed out".to_string()),
            ApiError::Network(msg) => AuthError::Network(msg),
            other => AuthError::Api(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_become_network() {
        assert!(matches!(AuthError::from(ApiError::Timeout), AuthError::Network(_)));
        assert!(matches!(
            AuthError::from(ApiError::Network("connection refused".into())),
            AuthError::Network(msg) if msg == "connection refused"
        ));
    }

    #[test]
    fn test_http_errors_are_wrapped_unchanged() {
        assert!(matches!(
            AuthError::from(ApiError::NotFound("gone".into())),
            AuthError::Api(ApiError::NotFound(body)) if body == "gone"
        ));
    }

    #[test]
    fn test_requires_login() {
        assert!(AuthError::SessionExpired.requires_login());
        assert!(AuthError::Unauthenticated.requires_login());
        assert!(!AuthError::InvalidCredentials.requires_login());
        assert!(!AuthError::Validation(ValidationError::InvalidEmail).requires_login());
    }

    #[test]
    fn test_storage_keeps_context() {
        let err = anyhow::anyhow!("no keychain").context("Failed to store access token");
        match AuthError::storage(err) {
            AuthError::Storage(msg) => assert_eq!(msg, "Failed to store access token: no keychain"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
