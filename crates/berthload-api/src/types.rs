//! Shared types for the berthload API

use berthload_util::{DateRange, RequestId, ShipId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a wire string names no known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle status of a shipping request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Basket being assembled by its owner
    Draft,
    /// Submitted by the owner, awaiting a moderator
    Formed,
    /// Accepted by a moderator; loading time is frozen
    Completed,
    /// Rejected by a moderator
    Rejected,
    /// Soft-deleted by its owner
    Deleted,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Draft,
        RequestStatus::Formed,
        RequestStatus::Completed,
        RequestStatus::Rejected,
        RequestStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Formed => "formed",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Deleted => "deleted",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Deleted
        )
    }

    /// Whether the state machine has an edge from `self` to `next`
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Draft, Formed)
                | (Draft, Deleted)
                | (Formed, Completed)
                | (Formed, Rejected)
                | (Formed, Deleted)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "request status",
                value: s.to_string(),
            })
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Anonymous or unprivileged caller - catalog reads only
    Guest,
    /// Assembles and submits shipping requests
    Creator,
    /// Completes or rejects formed requests, curates the catalog
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Creator => "creator",
            Role::Moderator => "moderator",
        }
    }

    pub fn can_form(&self) -> bool {
        matches!(self, Role::Creator)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, Role::Moderator)
    }

    pub fn can_list_requests(&self) -> bool {
        matches!(self, Role::Creator | Role::Moderator)
    }

    pub fn can_edit_catalog(&self) -> bool {
        matches!(self, Role::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "creator" => Ok(Role::Creator),
            "moderator" => Ok(Role::Moderator),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Moderator decision on a formed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Accept,
    Reject,
}

impl CompletionOutcome {
    /// Status the request lands in
    pub fn target_status(&self) -> RequestStatus {
        match self {
            CompletionOutcome::Accept => RequestStatus::Completed,
            CompletionOutcome::Reject => RequestStatus::Rejected,
        }
    }
}

/// How a request is removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Row and associations are removed
    #[default]
    Hard,
    /// Status becomes `deleted`; associations are removed
    Soft,
}

/// Most cranes a catalog ship may declare
pub const MAX_SHIP_CRANES: i64 = 1_000;

/// Most units of one ship a request may carry
pub const MAX_SHIP_QUANTITY: i64 = 10_000;

/// Catalog ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub id: ShipId,
    pub name: String,
    /// Capacity in TEU
    pub capacity: f64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
    pub cranes: i64,
    pub containers: i64,
    pub description: String,
    pub photo_url: Option<String>,
    pub is_active: bool,
}

/// Fields supplied when creating or replacing a catalog ship
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipSpec {
    pub name: String,
    #[serde(default)]
    pub capacity: f64,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub draft: f64,
    #[serde(default)]
    pub cranes: i64,
    #[serde(default)]
    pub containers: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Catalog filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipFilter {
    /// Case-insensitive substring of the ship name
    pub name: Option<String>,
    pub min_capacity: Option<f64>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// The request aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingRequest {
    pub id: RequestId,
    pub owner_user_id: UserId,
    pub status: RequestStatus,
    pub creation_date: DateTime<Utc>,
    pub formation_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    pub moderator_id: Option<UserId>,
    pub containers_20ft_count: i64,
    pub containers_40ft_count: i64,
    pub comment: String,
    /// Estimated loading time in hours, set only on acceptance
    pub loading_time: Option<f64>,
}

impl ShippingRequest {
    pub fn has_containers(&self) -> bool {
        self.containers_20ft_count > 0 || self.containers_40ft_count > 0
    }
}

/// N units of one ship type attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipAssociation {
    pub request_id: RequestId,
    pub ship_id: ShipId,
    pub quantity: i64,
}

/// Association joined with the ship fields shown alongside a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipLine {
    pub ship_id: ShipId,
    pub name: String,
    pub cranes: i64,
    pub capacity: f64,
    pub photo_url: Option<String>,
    pub quantity: i64,
}

/// Request with its ship lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: ShippingRequest,
    pub ships: Vec<ShipLine>,
}

/// Summary of the caller's draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketView {
    /// `None` until the first ship is added
    pub request_id: Option<RequestId>,
    /// Sum of quantities over all lines
    pub ships_count: i64,
}

impl BasketView {
    pub fn empty() -> Self {
        Self {
            request_id: None,
            ships_count: 0,
        }
    }
}

/// Editable request fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFields {
    pub containers_20ft_count: Option<i64>,
    pub containers_40ft_count: Option<i64>,
    pub comment: Option<String>,
}

/// Request listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    /// Range over `creation_date`
    pub created: DateRange,
    pub status: Option<RequestStatus>,
    pub owner: Option<UserId>,
}

/// Public view of a user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub login: String,
    pub full_name: String,
    pub contacts: String,
    pub role: Role,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub store_ok: bool,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        for status in RequestStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in RequestStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in RequestStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(RequestStatus::Draft.can_transition_to(RequestStatus::Formed));
        assert!(RequestStatus::Formed.can_transition_to(RequestStatus::Completed));
        assert!(!RequestStatus::Draft.can_transition_to(RequestStatus::Completed));
        assert!(!RequestStatus::Formed.can_transition_to(RequestStatus::Draft));
    }

    #[test]
    fn role_permissions() {
        assert!(Role::Creator.can_form());
        assert!(!Role::Moderator.can_form());
        assert!(Role::Moderator.can_complete());
        assert!(!Role::Creator.can_complete());
        assert!(!Role::Guest.can_list_requests());
        assert_eq!("moderator".parse::<Role>().unwrap(), Role::Moderator);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn request_detail_flattens_request() {
        let detail = RequestDetail {
            request: ShippingRequest {
                id: RequestId::new(3),
                owner_user_id: UserId::new(1),
                status: RequestStatus::Draft,
                creation_date: Utc::now(),
                formation_date: None,
                completion_date: None,
                moderator_id: None,
                containers_20ft_count: 2,
                containers_40ft_count: 0,
                comment: String::new(),
                loading_time: None,
            },
            ships: vec![],
        };

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["status"], "draft");
        assert!(value["ships"].as_array().unwrap().is_empty());
    }
}
