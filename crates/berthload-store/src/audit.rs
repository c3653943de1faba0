//! Audit event types

use berthload_api::{CompletionOutcome, DeleteMode, RequestStatus, Role};
use berthload_util::{RequestId, ShipId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Draft opened for a user
    DraftCreated {
        request_id: RequestId,
        owner: UserId,
    },

    /// Owner submitted a draft
    RequestFormed { request_id: RequestId },

    /// Moderator decided on a formed request
    RequestCompleted {
        request_id: RequestId,
        moderator: UserId,
        outcome: CompletionOutcome,
        loading_time: Option<f64>,
    },

    /// Owner removed a request
    RequestDeleted {
        request_id: RequestId,
        previous_status: RequestStatus,
        mode: DeleteMode,
    },

    /// Catalog ship created, edited or deactivated
    ShipChanged { ship_id: ShipId, active: bool },

    /// User account registered
    UserRegistered { user_id: UserId, role: Role },

    /// Session opened
    UserLoggedIn { user_id: UserId },

    /// Session closed
    UserLoggedOut { user_id: UserId },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: berthload_util::now(),
            event,
        }
    }
}
