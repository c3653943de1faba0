//! Request lifecycle engine

use berthload_api::{
    BasketView, CompletionOutcome, DeleteMode, RequestDetail, RequestFields, RequestFilter,
    RequestStatus, ShipAssociation, ShipLine, ShippingRequest, MAX_SHIP_QUANTITY,
};
use berthload_store::{AuditEvent, AuditEventType, Completion, Guarded, Store, StoreError};
use berthload_util::{BerthError, RequestId, Result, ShipId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{loading_time, Violation};

/// Statuses in which the owner may still edit or delete a request
const OPEN: &[RequestStatus] = &[RequestStatus::Draft, RequestStatus::Formed];

/// Statuses that accept changes to the ship list
const DRAFT_ONLY: &[RequestStatus] = &[RequestStatus::Draft];

/// Find-then-insert rounds before giving up on settling a draft
const DRAFT_ATTEMPTS: usize = 3;

/// The request lifecycle engine
///
/// Holds no state of its own. Every rule that must survive concurrent
/// callers is enforced by the store, either by a constraint or by a write
/// conditioned on the request's current status.
#[derive(Clone)]
pub struct RequestEngine {
    store: Arc<dyn Store>,
}

impl RequestEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Return the owner's draft, opening one if needed.
    ///
    /// Two callers racing here both end up with the same draft: the loser's
    /// insert trips the one-draft index and it re-reads the winner's row.
    pub fn get_or_create_draft(&self, owner: UserId) -> Result<ShippingRequest> {
        for attempt in 0..DRAFT_ATTEMPTS {
            if let Some(draft) = self.store.find_draft(owner)? {
                return Ok(draft);
            }

            match self.store.insert_draft(owner, berthload_util::now()) {
                Ok(draft) => {
                    info!(request_id = %draft.id, owner = %owner, "Draft opened");
                    self.audit(AuditEventType::DraftCreated {
                        request_id: draft.id,
                        owner,
                    });
                    return Ok(draft);
                }
                Err(StoreError::Constraint(_)) => {
                    debug!(owner = %owner, attempt, "Lost draft insert race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(owner = %owner, "Could not settle a draft");
        Err(BerthError::conflict(format!(
            "draft for user {owner} changed concurrently"
        )))
    }

    /// Add one unit of a ship to a draft
    pub fn add_ship(&self, id: RequestId, ship_id: ShipId) -> Result<ShipAssociation> {
        let guarded = self.store.add_ship(id, ship_id, DRAFT_ONLY)?;
        let added = settle(id, guarded, |status| Violation::NotDraft { id, status })?;
        let Some(association) = added else {
            // Nothing was written: either the ship is unavailable or the line is full
            let full = self
                .store
                .ship_lines(id)?
                .iter()
                .any(|line| line.ship_id == ship_id && line.quantity >= MAX_SHIP_QUANTITY);
            if full {
                return Err(BerthError::invalid(format!(
                    "ship {ship_id} is already at the limit of {MAX_SHIP_QUANTITY} units"
                )));
            }
            return Err(BerthError::not_found(format!("ship {ship_id}")));
        };

        debug!(
            request_id = %id,
            ship_id = %ship_id,
            quantity = association.quantity,
            "Ship added"
        );
        Ok(association)
    }

    /// Add one unit of a ship to the owner's draft, opening it if needed
    pub fn add_to_basket(
        &self,
        owner: UserId,
        ship_id: ShipId,
    ) -> Result<(ShippingRequest, ShipAssociation)> {
        let draft = self.get_or_create_draft(owner)?;
        let association = self.add_ship(draft.id, ship_id)?;
        Ok((draft, association))
    }

    /// Drop a ship from a draft outright. Absent ships are ignored.
    pub fn remove_ship(&self, id: RequestId, ship_id: ShipId) -> Result<()> {
        let guarded = self.store.remove_ship(id, ship_id, DRAFT_ONLY)?;
        let removed = settle(id, guarded, |status| Violation::NotDraft { id, status })?;
        debug!(request_id = %id, ship_id = %ship_id, removed, "Ship removal");
        Ok(())
    }

    pub fn set_ship_quantity(
        &self,
        id: RequestId,
        ship_id: ShipId,
        quantity: i64,
    ) -> Result<ShipAssociation> {
        if !(1..=MAX_SHIP_QUANTITY).contains(&quantity) {
            return Err(BerthError::invalid(format!(
                "quantity must be between 1 and {MAX_SHIP_QUANTITY}, got {quantity}"
            )));
        }

        let guarded = self.store.set_quantity(id, ship_id, quantity, OPEN)?;
        settle(id, guarded, |status| Violation::Terminal { id, status })?.ok_or_else(|| {
            BerthError::not_found(format!("ship {ship_id} is not on request {id}"))
        })
    }

    /// Update container counts and comment. Loading time is left alone.
    pub fn update_fields(&self, id: RequestId, fields: &RequestFields) -> Result<ShippingRequest> {
        for (name, value) in [
            ("containers_20ft_count", fields.containers_20ft_count),
            ("containers_40ft_count", fields.containers_40ft_count),
        ] {
            if let Some(count) = value
                && count < 0
            {
                return Err(BerthError::invalid(format!(
                    "{name} must not be negative, got {count}"
                )));
            }
        }

        let guarded = self.store.update_fields(id, fields, OPEN)?;
        settle(id, guarded, |status| Violation::Terminal { id, status })
    }

    /// Submit a draft for moderation
    pub fn form(&self, id: RequestId) -> Result<ShippingRequest> {
        if self.store.form_request(id, berthload_util::now())? {
            let formed = self.require(id)?;
            info!(request_id = %id, owner = %formed.owner_user_id, "Request formed");
            self.audit(AuditEventType::RequestFormed { request_id: id });
            return Ok(formed);
        }

        // The conditional update matched nothing; find out which rule failed
        let request = self.require(id)?;
        if request.status != RequestStatus::Draft {
            return Err(Violation::NotDraft {
                id,
                status: request.status,
            }
            .into());
        }
        if self.store.ship_lines(id)?.is_empty() {
            return Err(Violation::NoShips { id }.into());
        }
        if !request.has_containers() {
            return Err(Violation::NoContainers { id }.into());
        }

        Err(BerthError::conflict(format!(
            "request {id} changed while forming"
        )))
    }

    /// Accept or reject a formed request. Acceptance freezes the loading time.
    pub fn complete(
        &self,
        id: RequestId,
        moderator: UserId,
        outcome: CompletionOutcome,
    ) -> Result<ShippingRequest> {
        let completion = Completion {
            moderator_id: moderator,
            outcome,
            at: berthload_util::now(),
        };
        let estimate = |request: &ShippingRequest, lines: &[ShipLine]| {
            loading_time(
                lines,
                request.containers_20ft_count,
                request.containers_40ft_count,
            )
        };

        let guarded = self.store.complete_request(id, &completion, &estimate)?;
        let completed = settle(id, guarded, |status| Violation::NotFormed { id, status })?;

        info!(
            request_id = %id,
            moderator = %moderator,
            status = %completed.status,
            loading_time = ?completed.loading_time,
            "Request completed"
        );
        self.audit(AuditEventType::RequestCompleted {
            request_id: id,
            moderator,
            outcome,
            loading_time: completed.loading_time,
        });

        Ok(completed)
    }

    pub fn delete(&self, id: RequestId, mode: DeleteMode) -> Result<()> {
        let previous = self.require(id)?.status;
        let guarded = self.store.delete_request(id, mode, OPEN)?;
        settle(id, guarded, |status| Violation::Terminal { id, status })?;

        info!(request_id = %id, ?mode, "Request deleted");
        self.audit(AuditEventType::RequestDeleted {
            request_id: id,
            previous_status: previous,
            mode,
        });
        Ok(())
    }

    /// Non-deleted requests, ordered by creation date then id
    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<ShippingRequest>> {
        if filter.created.is_inverted() {
            return Err(BerthError::invalid("date range ends before it starts"));
        }
        Ok(self.store.list_requests(filter)?)
    }

    /// A request with its ship lines
    pub fn get(&self, id: RequestId) -> Result<RequestDetail> {
        let request = self.require(id)?;
        let ships = self.store.ship_lines(id)?;
        Ok(RequestDetail { request, ships })
    }

    /// Summary of the owner's draft, if one is open
    pub fn basket(&self, owner: UserId) -> Result<BasketView> {
        let Some(draft) = self.store.find_draft(owner)? else {
            return Ok(BasketView::empty());
        };
        let lines = self.store.ship_lines(draft.id)?;
        Ok(BasketView {
            request_id: Some(draft.id),
            ships_count: lines
                .iter()
                .fold(0i64, |count, line| count.saturating_add(line.quantity)),
        })
    }

    /// Fetch a request, treating soft-deleted rows as gone
    pub fn require(&self, id: RequestId) -> Result<ShippingRequest> {
        match self.store.get_request(id)? {
            Some(request) if request.status != RequestStatus::Deleted => Ok(request),
            _ => Err(BerthError::not_found(format!("request {id}"))),
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

/// Turn a guarded store outcome into the engine's result
fn settle<T>(
    id: RequestId,
    guarded: Guarded<T>,
    violation: impl FnOnce(RequestStatus) -> Violation,
) -> Result<T> {
    match guarded {
        Guarded::Applied(value) => Ok(value),
        Guarded::NoSuchRequest | Guarded::StatusMismatch(RequestStatus::Deleted) => {
            Err(BerthError::not_found(format!("request {id}")))
        }
        Guarded::StatusMismatch(status) => Err(violation(status).into()),
    }
}
