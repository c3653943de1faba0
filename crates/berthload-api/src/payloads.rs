//! HTTP payload types for the berthload protocol

use berthload_util::{BerthError, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CompletionOutcome, DeleteMode, UserView};

/// Account registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub contacts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Issued credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub contacts: Option<String>,
}

/// Body of `PUT requests/{id}/completion`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub outcome: CompletionOutcome,
}

/// Body of `PUT requests/{id}/ships/{ship_id}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

/// Query of `GET requests`; dates are `YYYY-MM-DD`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestListQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
}

/// Query of `GET ships`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipListQuery {
    pub name: Option<String>,
    pub min_capacity: Option<f64>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query of `DELETE requests/{id}`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub mode: DeleteMode,
}

/// Error information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// Violated lifecycle rule, for `precondition_failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rule: None,
        }
    }
}

impl From<&BerthError> for ErrorInfo {
    fn from(err: &BerthError) -> Self {
        let code = match err {
            BerthError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            BerthError::Forbidden(_) => ErrorCode::Forbidden,
            BerthError::NotFound(_) => ErrorCode::NotFound,
            BerthError::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            BerthError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            BerthError::Conflict(_) => ErrorCode::Conflict,
            BerthError::Unavailable(_) => ErrorCode::Unavailable,
            BerthError::Internal(_) => ErrorCode::InternalError,
        };
        let message = match err {
            BerthError::PreconditionFailed { message, .. } => message.clone(),
            BerthError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        Self {
            code,
            message,
            rule: err.rule().map(str::to_string),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthenticated,
    Forbidden,
    NotFound,
    PreconditionFailed,
    InvalidArgument,
    Conflict,
    Unavailable,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_error_exposes_rule() {
        let err = BerthError::precondition("request_not_draft", "request 5 is formed");
        let info = ErrorInfo::from(&err);

        assert_eq!(info.code, ErrorCode::PreconditionFailed);
        assert_eq!(info.rule.as_deref(), Some("request_not_draft"));
        assert_eq!(info.message, "request 5 is formed");
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let info = ErrorInfo::from(&BerthError::internal("jwt key rejected"));
        assert_eq!(info.code, ErrorCode::InternalError);
        assert!(!info.message.contains("jwt"));

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("rule").is_none());
    }

    #[test]
    fn delete_query_defaults_to_hard() {
        let query: DeleteQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.mode, DeleteMode::Hard);
    }
}
