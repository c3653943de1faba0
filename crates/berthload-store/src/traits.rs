//! Store trait definitions

use berthload_api::{
    CompletionOutcome, DeleteMode, RequestFields, RequestFilter, RequestStatus, Role, Ship,
    ShipAssociation, ShipFilter, ShipLine, ShipSpec, ShippingRequest, UserView,
};
use berthload_util::{RequestId, ShipId, UserId};
use chrono::{DateTime, Utc};

use crate::{AuditEvent, StoreResult};

/// Outcome of a write guarded by the request's current status.
///
/// The status is read and the write applied inside one immediate
/// transaction, so a concurrent writer cannot slip between them.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    /// The status was acceptable and the write was applied
    Applied(T),
    /// No request with that id
    NoSuchRequest,
    /// The request was in a status the write does not accept
    StatusMismatch(RequestStatus),
}

/// Moderator decision to persist on a formed request
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub moderator_id: UserId,
    pub outcome: CompletionOutcome,
    pub at: DateTime<Utc>,
}

/// Computes the loading time of a request from its current lines
pub type LoadingEstimator<'a> = &'a dyn Fn(&ShippingRequest, &[ShipLine]) -> f64;

/// Stored user account
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
    pub full_name: String,
    pub contacts: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Public view without credentials
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            login: self.login.clone(),
            full_name: self.full_name.clone(),
            contacts: self.contacts.clone(),
            role: self.role,
        }
    }
}

/// Account to insert
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub full_name: String,
    pub contacts: String,
    pub role: Role,
}

/// Main store trait
pub trait Store: ShipCatalog + RequestStore + UserStore + AuditLog {
    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Ship definitions. The request engine only reads them.
pub trait ShipCatalog: Send + Sync {
    fn get_ship(&self, id: ShipId) -> StoreResult<Option<Ship>>;

    /// Ships matching the filter, ordered by id
    fn list_ships(&self, filter: &ShipFilter) -> StoreResult<Vec<Ship>>;

    fn create_ship(&self, spec: &ShipSpec) -> StoreResult<Ship>;

    /// Replace a ship's descriptive fields; `None` if absent
    fn update_ship(&self, id: ShipId, spec: &ShipSpec) -> StoreResult<Option<Ship>>;

    /// Toggle `is_active`; false if absent
    fn set_ship_active(&self, id: ShipId, active: bool) -> StoreResult<bool>;

    fn count_ships(&self) -> StoreResult<usize>;
}

/// Shipping requests and their ship associations
pub trait RequestStore: Send + Sync {
    // Drafts

    /// The owner's current draft, if any
    fn find_draft(&self, owner: UserId) -> StoreResult<Option<ShippingRequest>>;

    /// Insert a new draft.
    ///
    /// Fails with `StoreError::Constraint` if the owner already has one.
    fn insert_draft(&self, owner: UserId, created_at: DateTime<Utc>)
    -> StoreResult<ShippingRequest>;

    // Reads

    fn get_request(&self, id: RequestId) -> StoreResult<Option<ShippingRequest>>;

    /// Non-deleted requests matching the filter, ordered by creation date then id
    fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<ShippingRequest>>;

    /// Ship lines of a request, ordered by ship id
    fn ship_lines(&self, id: RequestId) -> StoreResult<Vec<ShipLine>>;

    // Field and association writes

    fn update_fields(
        &self,
        id: RequestId,
        fields: &RequestFields,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<ShippingRequest>>;

    /// Insert with quantity 1 or increment. `None` if the ship is absent or
    /// inactive, or the line is already at `MAX_SHIP_QUANTITY`.
    fn add_ship(
        &self,
        id: RequestId,
        ship_id: ShipId,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<Option<ShipAssociation>>>;

    /// Overwrite the quantity. `None` if the association does not exist.
    fn set_quantity(
        &self,
        id: RequestId,
        ship_id: ShipId,
        quantity: i64,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<Option<ShipAssociation>>>;

    /// Delete the association row. `false` if there was none.
    fn remove_ship(
        &self,
        id: RequestId,
        ship_id: ShipId,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<bool>>;

    // Transitions

    /// `draft -> formed` as one conditional update that also requires at
    /// least one association and a container count. False when any
    /// condition fails.
    fn form_request(&self, id: RequestId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// `formed -> completed | rejected`. On accept the estimator runs inside
    /// the transaction and its result is frozen with the status change.
    fn complete_request(
        &self,
        id: RequestId,
        completion: &Completion,
        estimate: LoadingEstimator<'_>,
    ) -> StoreResult<Guarded<ShippingRequest>>;

    /// Remove the associations, then the row (hard) or mark it deleted (soft)
    fn delete_request(
        &self,
        id: RequestId,
        mode: DeleteMode,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<()>>;
}

/// User accounts
pub trait UserStore: Send + Sync {
    /// Fails with `StoreError::Constraint` on a duplicate login
    fn create_user(&self, user: &NewUser) -> StoreResult<UserRecord>;

    fn get_user(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    fn find_user_by_login(&self, login: &str) -> StoreResult<Option<UserRecord>>;

    /// Update profile fields; `None` leaves a field unchanged
    fn update_profile(
        &self,
        id: UserId,
        full_name: Option<&str>,
        contacts: Option<&str>,
    ) -> StoreResult<Option<UserRecord>>;
}

/// Append-only audit trail
pub trait AuditLog: Send + Sync {
    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;
}
