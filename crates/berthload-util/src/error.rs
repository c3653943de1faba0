//! Error taxonomy for berthload

use thiserror::Error;

/// Error type shared by every layer that serves a caller.
///
/// Each variant is a distinct outcome callers can branch on. Lower layers
/// (store, auth, config) keep their own error enums and convert into this
/// one at the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BerthError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A lifecycle rule was broken. `rule` is a stable machine-readable name.
    #[error("Precondition failed ({rule}): {message}")]
    PreconditionFailed { rule: &'static str, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A concurrent writer won the race; re-read and retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BerthError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn precondition(rule: &'static str, msg: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            rule,
            message: msg.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Name of the violated rule, for `PreconditionFailed` only
    pub fn rule(&self) -> Option<&'static str> {
        match self {
            Self::PreconditionFailed { rule, .. } => Some(rule),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BerthError>;
