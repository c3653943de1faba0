//! Authentication error types

use berthload_util::BerthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication required")]
    MissingCredentials,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// Token verified but its session is gone or superseded
    #[error("session is no longer active")]
    SessionRevoked,

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for BerthError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Crypto(msg) => BerthError::Internal(msg),
            other => BerthError::Unauthenticated(other.to_string()),
        }
    }
}
