//! The access gate
//!
//! Every caller-facing operation goes through here: the credential is
//! resolved to an [`Identity`] (or a guest, for catalog reads), the role and
//! ownership rules are checked, and the call is forwarded to the
//! [`RequestEngine`] or the ship catalog.

use berthload_api::{
    BasketView, CompletionOutcome, DeleteMode, LoginRequest, LoginResponse, ProfileUpdate,
    RegisterRequest, RequestDetail, RequestFields, RequestFilter, RequestStatus, Role, Ship,
    ShipAssociation, ShipFilter, ShipSpec, ShippingRequest, UserView, MAX_SHIP_CRANES,
};
use berthload_core::RequestEngine;
use berthload_store::{
    AuditEvent, AuditEventType, NewUser, SessionOp, SessionStore, Store, StoreError, UserRecord,
};
use berthload_util::{
    format_timestamp, parse_timestamp, BerthError, RequestId, Result, SessionId, ShipId, UserId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{hash_password, verify_password, AuthError, Credential, TokenIssuer};

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 6;

/// Longest accepted login
pub const MAX_LOGIN_LEN: usize = 64;

/// Rounds of the watched session swap before a login gives up
const LOGIN_ATTEMPTS: usize = 5;

const FIELD_USER_ID: &str = "user_id";
const FIELD_ROLE: &str = "role";
const FIELD_EXPIRES_AT: &str = "expires_at";

fn session_key(session_id: &SessionId) -> String {
    format!("session:{session_id}")
}

fn token_key(user_id: UserId) -> String {
    format!("token:{user_id}")
}

/// A caller with a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub session_id: SessionId,
}

/// Who is calling an operation that also admits anonymous callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Guest,
    Authenticated(Identity),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Guest => Role::Guest,
            Principal::Authenticated(identity) => identity.role,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Guest => None,
            Principal::Authenticated(identity) => Some(identity),
        }
    }
}

/// Account to create, with its plaintext password
#[derive(Debug, Clone)]
pub struct AccountSpec<'a> {
    pub login: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub contacts: &'a str,
    pub role: Role,
}

/// Resolves credentials and enforces who may do what
pub struct AccessGate {
    engine: RequestEngine,
    store: Arc<dyn Store>,
    sessions: Arc<dyn SessionStore>,
    issuer: TokenIssuer,
}

impl AccessGate {
    pub fn new(store: Arc<dyn Store>, sessions: Arc<dyn SessionStore>, issuer: TokenIssuer) -> Self {
        Self {
            engine: RequestEngine::new(store.clone()),
            store,
            sessions,
            issuer,
        }
    }

    pub fn engine(&self) -> &RequestEngine {
        &self.engine
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy() && self.sessions.is_healthy()
    }

    // Accounts

    /// Create an account with any role. Registration and moderator seeding
    /// both come through here.
    pub fn create_account(&self, spec: &AccountSpec<'_>) -> Result<UserRecord> {
        let login = spec.login.trim();
        if login.is_empty() || login.len() > MAX_LOGIN_LEN {
            return Err(BerthError::invalid(format!(
                "login must be 1 to {MAX_LOGIN_LEN} characters"
            )));
        }
        if spec.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BerthError::invalid(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let new_user = NewUser {
            login: login.to_string(),
            password_hash: hash_password(spec.password)?,
            full_name: spec.full_name.trim().to_string(),
            contacts: spec.contacts.trim().to_string(),
            role: spec.role,
        };

        let user = match self.store.create_user(&new_user) {
            Ok(user) => user,
            Err(StoreError::Constraint(_)) => {
                return Err(BerthError::conflict(format!("login '{login}' is taken")));
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = %user.id, login = %user.login, role = %user.role, "Account created");
        self.audit(AuditEventType::UserRegistered {
            user_id: user.id,
            role: user.role,
        });
        Ok(user)
    }

    /// Self-service registration; always yields a creator
    pub fn register(&self, request: &RegisterRequest) -> Result<UserView> {
        let user = self.create_account(&AccountSpec {
            login: &request.login,
            password: &request.password,
            full_name: &request.full_name,
            contacts: &request.contacts,
            role: Role::Creator,
        })?;
        Ok(user.view())
    }

    /// Create the account unless the login already exists. True if created.
    pub fn ensure_account(&self, spec: &AccountSpec<'_>) -> Result<bool> {
        if self.store.find_user_by_login(spec.login.trim())?.is_some() {
            return Ok(false);
        }
        match self.create_account(spec) {
            Ok(_) => Ok(true),
            // Created concurrently by someone else
            Err(BerthError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open a session. Any session the user already had is revoked.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let user = self
            .store
            .find_user_by_login(request.login.trim())?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        }

        let now = berthload_util::now();
        let session_id = SessionId::new();
        let (token, claims) = self.issuer.issue(user.id, user.role, &session_id, now)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| BerthError::internal("token expiry out of range"))?;
        let ttl = self.issuer.ttl();

        // The token index is watched so a concurrent login cannot leave the
        // session it replaced behind
        let index = token_key(user.id);
        let mut installed = false;
        for attempt in 0..LOGIN_ATTEMPTS {
            let previous = self.sessions.get(&index)?;

            let mut ops = Vec::with_capacity(3);
            if let Some(previous) = &previous
                && let Ok(old) = self.issuer.decode(previous)
                && let Ok(old_session) = old.session_id()
            {
                debug!(user_id = %user.id, session_id = %old_session, "Revoking previous session");
                ops.push(SessionOp::Del {
                    key: session_key(&old_session),
                });
            }
            ops.push(SessionOp::HashSet {
                key: session_key(&session_id),
                fields: vec![
                    (FIELD_USER_ID.to_string(), user.id.to_string()),
                    (FIELD_ROLE.to_string(), user.role.as_str().to_string()),
                    (FIELD_EXPIRES_AT.to_string(), format_timestamp(&expires_at)),
                ],
                ttl,
            });
            ops.push(SessionOp::Set {
                key: index.clone(),
                value: token.clone(),
                ttl,
            });

            if self.sessions.apply_if(&index, previous.as_deref(), ops)? {
                installed = true;
                break;
            }
            debug!(user_id = %user.id, attempt, "Concurrent login, retrying session swap");
        }
        if !installed {
            warn!(user_id = %user.id, "Could not install session");
            return Err(BerthError::conflict("concurrent logins for this account, retry"));
        }

        info!(user_id = %user.id, session_id = %session_id, "User logged in");
        self.audit(AuditEventType::UserLoggedIn { user_id: user.id });

        Ok(LoginResponse {
            token,
            session_id,
            expires_at,
            user: user.view(),
        })
    }

    /// Close the caller's session; its token stops working immediately
    pub fn logout(&self, credential: &Credential) -> Result<()> {
        let identity = self.authenticate(credential)?;
        self.sessions.apply(vec![
            SessionOp::Del {
                key: session_key(&identity.session_id),
            },
            SessionOp::Del {
                key: token_key(identity.user_id),
            },
        ])?;

        info!(user_id = %identity.user_id, session_id = %identity.session_id, "User logged out");
        self.audit(AuditEventType::UserLoggedOut {
            user_id: identity.user_id,
        });
        Ok(())
    }

    pub fn profile(&self, credential: &Credential) -> Result<UserView> {
        let identity = self.authenticate(credential)?;
        let user = self
            .store
            .get_user(identity.user_id)?
            .ok_or_else(|| BerthError::not_found(format!("user {}", identity.user_id)))?;
        Ok(user.view())
    }

    pub fn update_profile(&self, credential: &Credential, update: &ProfileUpdate) -> Result<UserView> {
        let identity = self.authenticate(credential)?;
        let user = self
            .store
            .update_profile(
                identity.user_id,
                update.full_name.as_deref().map(str::trim),
                update.contacts.as_deref().map(str::trim),
            )?
            .ok_or_else(|| BerthError::not_found(format!("user {}", identity.user_id)))?;
        Ok(user.view())
    }

    // Credential resolution

    /// Resolve a credential to a live session. Fails closed: the session
    /// record must exist and agree with the token, and the user's token
    /// index must still point at this exact token.
    pub fn authenticate(&self, credential: &Credential) -> Result<Identity> {
        let token = match credential {
            Credential::Token(token) => token,
            Credential::Missing => return Err(AuthError::MissingCredentials.into()),
            Credential::Malformed => {
                return Err(AuthError::TokenInvalid("malformed authorization header".into()).into());
            }
        };

        let now = berthload_util::now();
        let claims = self.issuer.verify(token, now)?;
        let user_id = claims.user_id()?;
        let session_id = claims.session_id()?;

        let record = self
            .sessions
            .hash_get_all(&session_key(&session_id))?
            .ok_or(AuthError::SessionRevoked)?;

        let record_matches = record.get(FIELD_USER_ID) == Some(&user_id.to_string())
            && record.get(FIELD_ROLE).map(String::as_str) == Some(claims.role.as_str())
            && record
                .get(FIELD_EXPIRES_AT)
                .and_then(|raw| parse_timestamp(raw))
                .is_some_and(|expires_at| expires_at > now);
        if !record_matches {
            warn!(session_id = %session_id, "Session record disagrees with token");
            return Err(AuthError::SessionRevoked.into());
        }

        let current = self.sessions.get(&token_key(user_id))?;
        if current.as_deref() != Some(token.as_str()) {
            debug!(user_id = %user_id, "Token superseded by a newer login");
            return Err(AuthError::SessionRevoked.into());
        }

        Ok(Identity {
            user_id,
            role: claims.role,
            session_id,
        })
    }

    /// Like [`AccessGate::authenticate`], but any authentication failure
    /// yields a guest instead of an error
    pub fn principal(&self, credential: &Credential) -> Result<Principal> {
        match self.authenticate(credential) {
            Ok(identity) => Ok(Principal::Authenticated(identity)),
            Err(BerthError::Unauthenticated(reason)) => {
                if !matches!(credential, Credential::Missing) {
                    debug!(%reason, "Continuing as guest");
                }
                Ok(Principal::Guest)
            }
            Err(e) => Err(e),
        }
    }

    fn moderator(&self, credential: &Credential) -> Result<Identity> {
        let identity = self.authenticate(credential)?;
        if !identity.role.can_complete() {
            return Err(BerthError::forbidden("moderator role required"));
        }
        Ok(identity)
    }

    /// Authenticate and load a request the caller owns
    fn owned(&self, credential: &Credential, id: RequestId) -> Result<(Identity, ShippingRequest)> {
        let identity = self.authenticate(credential)?;
        let request = self.engine.require(id)?;
        if request.owner_user_id != identity.user_id {
            return Err(BerthError::forbidden(format!("request {id} belongs to another user")));
        }
        Ok((identity, request))
    }

    // Ship catalog

    /// Catalog listing. Inactive ships are shown to moderators only.
    pub fn list_ships(&self, credential: &Credential, mut filter: ShipFilter) -> Result<Vec<Ship>> {
        let principal = self.principal(credential)?;
        if !principal.role().can_edit_catalog() {
            filter.include_inactive = false;
        }
        Ok(self.store.list_ships(&filter)?)
    }

    pub fn get_ship(&self, credential: &Credential, id: ShipId) -> Result<Ship> {
        let principal = self.principal(credential)?;
        match self.store.get_ship(id)? {
            Some(ship) if ship.is_active || principal.role().can_edit_catalog() => Ok(ship),
            _ => Err(BerthError::not_found(format!("ship {id}"))),
        }
    }

    pub fn create_ship(&self, credential: &Credential, spec: &ShipSpec) -> Result<Ship> {
        self.moderator(credential)?;
        validate_ship(spec)?;
        let ship = self.store.create_ship(spec)?;
        info!(ship_id = %ship.id, name = %ship.name, "Ship created");
        self.audit(AuditEventType::ShipChanged {
            ship_id: ship.id,
            active: ship.is_active,
        });
        Ok(ship)
    }

    pub fn update_ship(&self, credential: &Credential, id: ShipId, spec: &ShipSpec) -> Result<Ship> {
        self.moderator(credential)?;
        validate_ship(spec)?;
        let ship = self
            .store
            .update_ship(id, spec)?
            .ok_or_else(|| BerthError::not_found(format!("ship {id}")))?;
        self.audit(AuditEventType::ShipChanged {
            ship_id: id,
            active: ship.is_active,
        });
        Ok(ship)
    }

    /// Take a ship out of the catalog. Requests that already carry it keep it.
    pub fn deactivate_ship(&self, credential: &Credential, id: ShipId) -> Result<()> {
        self.moderator(credential)?;
        if !self.store.set_ship_active(id, false)? {
            return Err(BerthError::not_found(format!("ship {id}")));
        }
        info!(ship_id = %id, "Ship deactivated");
        self.audit(AuditEventType::ShipChanged {
            ship_id: id,
            active: false,
        });
        Ok(())
    }

    // Requests

    /// Put one unit of a ship into the caller's draft
    pub fn add_to_basket(&self, credential: &Credential, ship_id: ShipId) -> Result<ShipAssociation> {
        let identity = self.authenticate(credential)?;
        let (_, association) = self.engine.add_to_basket(identity.user_id, ship_id)?;
        Ok(association)
    }

    pub fn basket(&self, credential: &Credential) -> Result<BasketView> {
        let identity = self.authenticate(credential)?;
        self.engine.basket(identity.user_id)
    }

    /// Creators see their own requests. Moderators see everything that has
    /// left draft, plus their own drafts.
    pub fn list_requests(
        &self,
        credential: &Credential,
        mut filter: RequestFilter,
    ) -> Result<Vec<ShippingRequest>> {
        let identity = self.authenticate(credential)?;
        match identity.role {
            Role::Creator => {
                filter.owner = Some(identity.user_id);
                self.engine.list(&filter)
            }
            Role::Moderator => {
                let requests = self.engine.list(&filter)?;
                Ok(requests
                    .into_iter()
                    .filter(|r| {
                        r.status != RequestStatus::Draft || r.owner_user_id == identity.user_id
                    })
                    .collect())
            }
            Role::Guest => Err(BerthError::forbidden("listing requests requires an account")),
        }
    }

    pub fn get_request(&self, credential: &Credential, id: RequestId) -> Result<RequestDetail> {
        let identity = self.authenticate(credential)?;
        let detail = self.engine.get(id)?;
        let request = &detail.request;

        let visible = request.owner_user_id == identity.user_id
            || (identity.role.can_complete() && request.status != RequestStatus::Draft);
        if !visible {
            return Err(BerthError::forbidden(format!("request {id} belongs to another user")));
        }
        Ok(detail)
    }

    pub fn update_request(
        &self,
        credential: &Credential,
        id: RequestId,
        fields: &RequestFields,
    ) -> Result<ShippingRequest> {
        self.owned(credential, id)?;
        self.engine.update_fields(id, fields)
    }

    pub fn form_request(&self, credential: &Credential, id: RequestId) -> Result<ShippingRequest> {
        let (identity, _) = self.owned(credential, id)?;
        if !identity.role.can_form() {
            return Err(BerthError::forbidden("creator role required"));
        }
        self.engine.form(id)
    }

    pub fn complete_request(
        &self,
        credential: &Credential,
        id: RequestId,
        outcome: CompletionOutcome,
    ) -> Result<ShippingRequest> {
        let identity = self.moderator(credential)?;
        self.engine.complete(id, identity.user_id, outcome)
    }

    pub fn set_ship_quantity(
        &self,
        credential: &Credential,
        id: RequestId,
        ship_id: ShipId,
        quantity: i64,
    ) -> Result<ShipAssociation> {
        self.owned(credential, id)?;
        self.engine.set_ship_quantity(id, ship_id, quantity)
    }

    pub fn remove_ship(&self, credential: &Credential, id: RequestId, ship_id: ShipId) -> Result<()> {
        self.owned(credential, id)?;
        self.engine.remove_ship(id, ship_id)
    }

    pub fn delete_request(&self, credential: &Credential, id: RequestId, mode: DeleteMode) -> Result<()> {
        self.owned(credential, id)?;
        self.engine.delete(id, mode)
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

fn validate_ship(spec: &ShipSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(BerthError::invalid("ship name must not be empty"));
    }
    if spec.cranes < 0 || spec.containers < 0 {
        return Err(BerthError::invalid("crane and container counts must not be negative"));
    }
    if spec.cranes > MAX_SHIP_CRANES {
        return Err(BerthError::invalid(format!(
            "a ship may have at most {MAX_SHIP_CRANES} cranes, got {}",
            spec.cranes
        )));
    }
    if [spec.capacity, spec.length, spec.width, spec.draft]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
    {
        return Err(BerthError::invalid("ship dimensions must be non-negative numbers"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berthload_store::{AuditLog, MemorySessionStore, ShipCatalog, SqliteStore};
    use std::time::Duration;

    const SECRET: &[u8] = b"test-signing-key-test-signing-key";

    struct Fixture {
        gate: AccessGate,
        sessions: Arc<MemorySessionStore>,
        store: Arc<SqliteStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sessions = Arc::new(MemorySessionStore::new());
        let gate = AccessGate::new(
            store.clone(),
            sessions.clone(),
            TokenIssuer::new(SECRET, Duration::from_secs(3600)),
        );
        Fixture {
            gate,
            sessions,
            store,
        }
    }

    fn account(f: &Fixture, login: &str, role: Role) -> Credential {
        f.gate
            .create_account(&AccountSpec {
                login,
                password: "secret1",
                full_name: login,
                contacts: "",
                role,
            })
            .unwrap();
        login_as(f, login)
    }

    fn login_as(f: &Fixture, login: &str) -> Credential {
        let response = f
            .gate
            .login(&LoginRequest {
                login: login.into(),
                password: "secret1".into(),
            })
            .unwrap();
        Credential::Token(response.token)
    }

    fn ship(f: &Fixture, cranes: i64) -> ShipId {
        f.store
            .create_ship(&ShipSpec {
                name: format!("Ship with {cranes} cranes"),
                cranes,
                ..Default::default()
            })
            .unwrap()
            .id
    }

    /// A formed request owned by the given creator
    fn formed_request(f: &Fixture, creator: &Credential) -> RequestId {
        let ship_id = ship(f, 2);
        let association = f.gate.add_to_basket(creator, ship_id).unwrap();
        let id = association.request_id;
        f.gate
            .update_request(
                creator,
                id,
                &RequestFields {
                    containers_20ft_count: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();
        f.gate.form_request(creator, id).unwrap();
        id
    }

    #[test]
    fn test_register_and_duplicate_login() {
        let f = fixture();
        let request = RegisterRequest {
            login: "alice".into(),
            password: "secret1".into(),
            full_name: "Alice".into(),
            contacts: String::new(),
        };

        let user = f.gate.register(&request).unwrap();
        assert_eq!(user.role, Role::Creator);

        let err = f.gate.register(&request).unwrap_err();
        assert!(matches!(err, BerthError::Conflict(_)));
    }

    #[test]
    fn test_register_validation() {
        let f = fixture();
        let short = RegisterRequest {
            login: "bob".into(),
            password: "12345".into(),
            full_name: String::new(),
            contacts: String::new(),
        };
        assert!(matches!(
            f.gate.register(&short),
            Err(BerthError::InvalidArgument(_))
        ));

        let blank = RegisterRequest {
            login: "   ".into(),
            password: "123456".into(),
            ..short
        };
        assert!(matches!(
            f.gate.register(&blank),
            Err(BerthError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bad_password_is_unauthenticated() {
        let f = fixture();
        account(&f, "alice", Role::Creator);

        let err = f
            .gate
            .login(&LoginRequest {
                login: "alice".into(),
                password: "wrong-password".into(),
            })
            .unwrap_err();
        assert!(matches!(err, BerthError::Unauthenticated(_)));

        let err = f
            .gate
            .login(&LoginRequest {
                login: "nobody".into(),
                password: "secret1".into(),
            })
            .unwrap_err();
        assert!(matches!(err, BerthError::Unauthenticated(_)));
    }

    #[test]
    fn test_login_writes_session_and_index() {
        let f = fixture();
        let cred = account(&f, "alice", Role::Creator);

        let identity = f.gate.authenticate(&cred).unwrap();
        assert_eq!(identity.role, Role::Creator);
        assert_eq!(f.sessions.len(), 2);
        assert_eq!(
            f.sessions.get(&token_key(identity.user_id)).unwrap().as_deref(),
            cred.token()
        );
    }

    #[test]
    fn test_relogin_revokes_older_token() {
        let f = fixture();
        let first = account(&f, "alice", Role::Creator);
        let second = login_as(&f, "alice");

        assert!(matches!(
            f.gate.authenticate(&first),
            Err(BerthError::Unauthenticated(_))
        ));
        assert!(f.gate.authenticate(&second).is_ok());
        // Old session record is gone, new one and the index remain
        assert_eq!(f.sessions.len(), 2);
    }

    #[test]
    fn test_concurrent_logins_leave_one_session() {
        let f = fixture();
        account(&f, "alice", Role::Creator);
        f.gate.logout(&login_as(&f, "alice")).unwrap();
        assert!(f.sessions.is_empty());

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        f.gate.login(&LoginRequest {
                            login: "alice".into(),
                            password: "secret1".into(),
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let tokens: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
        assert!(!tokens.is_empty());

        // One session hash plus the token index; no orphaned session records
        assert_eq!(f.sessions.len(), 2);
        let live = tokens
            .iter()
            .filter(|t| f.gate.authenticate(&Credential::Token(t.token.clone())).is_ok())
            .count();
        assert_eq!(live, 1);
    }

    #[test]
    fn test_logout_invalidates_token() {
        let f = fixture();
        let cred = account(&f, "alice", Role::Creator);

        f.gate.logout(&cred).unwrap();
        assert!(f.sessions.is_empty());
        assert!(matches!(
            f.gate.profile(&cred),
            Err(BerthError::Unauthenticated(_))
        ));
        assert!(matches!(
            f.gate.logout(&cred),
            Err(BerthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_missing_session_record_fails_closed() {
        let f = fixture();
        let cred = account(&f, "alice", Role::Creator);
        let identity = f.gate.authenticate(&cred).unwrap();

        f.sessions.del(&session_key(&identity.session_id)).unwrap();
        assert!(matches!(
            f.gate.authenticate(&cred),
            Err(BerthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_anonymous_catalog_reads() {
        let f = fixture();
        let active = ship(&f, 3);
        let retired = ship(&f, 1);
        f.store.set_ship_active(retired, false).unwrap();

        let ships = f
            .gate
            .list_ships(
                &Credential::Missing,
                ShipFilter {
                    include_inactive: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ships.len(), 1);
        assert_eq!(ships[0].id, active);

        // A bad token still reads the catalog as a guest
        let bogus = Credential::Token("garbage".into());
        assert!(f.gate.get_ship(&bogus, active).is_ok());
        assert!(matches!(
            f.gate.get_ship(&bogus, retired),
            Err(BerthError::NotFound(_))
        ));

        let moderator = account(&f, "mod", Role::Moderator);
        assert!(f.gate.get_ship(&moderator, retired).is_ok());
    }

    #[test]
    fn test_catalog_writes_need_moderator() {
        let f = fixture();
        let creator = account(&f, "alice", Role::Creator);
        let moderator = account(&f, "mod", Role::Moderator);
        let spec = ShipSpec {
            name: "Ever Ace".into(),
            cranes: 4,
            ..Default::default()
        };

        assert!(matches!(
            f.gate.create_ship(&creator, &spec),
            Err(BerthError::Forbidden(_))
        ));
        assert!(matches!(
            f.gate.create_ship(&Credential::Missing, &spec),
            Err(BerthError::Unauthenticated(_))
        ));

        let ship = f.gate.create_ship(&moderator, &spec).unwrap();
        f.gate.deactivate_ship(&moderator, ship.id).unwrap();
        assert!(matches!(
            f.gate.add_to_basket(&creator, ship.id),
            Err(BerthError::NotFound(_))
        ));
    }

    #[test]
    fn test_crane_count_is_bounded() {
        let f = fixture();
        let moderator = account(&f, "mod", Role::Moderator);
        let mut spec = ShipSpec {
            name: "Crane Forest".into(),
            cranes: MAX_SHIP_CRANES + 1,
            ..Default::default()
        };

        assert!(matches!(
            f.gate.create_ship(&moderator, &spec),
            Err(BerthError::InvalidArgument(_))
        ));

        spec.cranes = MAX_SHIP_CRANES;
        let ship = f.gate.create_ship(&moderator, &spec).unwrap();
        spec.cranes = i64::MAX;
        assert!(matches!(
            f.gate.update_ship(&moderator, ship.id, &spec),
            Err(BerthError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_role_rules_on_transitions() {
        let f = fixture();
        let creator = account(&f, "alice", Role::Creator);
        let moderator = account(&f, "mod", Role::Moderator);

        // A moderator may fill a basket but not form it
        let association = f.gate.add_to_basket(&moderator, ship(&f, 1)).unwrap();
        assert!(matches!(
            f.gate.form_request(&moderator, association.request_id),
            Err(BerthError::Forbidden(_))
        ));

        let id = formed_request(&f, &creator);
        assert!(matches!(
            f.gate.complete_request(&creator, id, CompletionOutcome::Accept),
            Err(BerthError::Forbidden(_))
        ));

        let done = f
            .gate
            .complete_request(&moderator, id, CompletionOutcome::Accept)
            .unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.loading_time, Some(4.0));
    }

    #[test]
    fn test_non_owner_is_forbidden() {
        let f = fixture();
        let alice = account(&f, "alice", Role::Creator);
        let bob = account(&f, "bob", Role::Creator);
        let association = f.gate.add_to_basket(&alice, ship(&f, 2)).unwrap();
        let id = association.request_id;

        assert!(matches!(f.gate.get_request(&bob, id), Err(BerthError::Forbidden(_))));
        assert!(matches!(
            f.gate.delete_request(&bob, id, DeleteMode::Hard),
            Err(BerthError::Forbidden(_))
        ));
        assert!(matches!(
            f.gate.set_ship_quantity(&bob, id, association.ship_id, 3),
            Err(BerthError::Forbidden(_))
        ));
        assert!(f.gate.get_request(&alice, id).is_ok());
    }

    #[test]
    fn test_moderator_visibility() {
        let f = fixture();
        let alice = account(&f, "alice", Role::Creator);
        let bob = account(&f, "bob", Role::Creator);
        let moderator = account(&f, "mod", Role::Moderator);

        let formed = formed_request(&f, &alice);
        let bobs_draft = f.gate.add_to_basket(&bob, ship(&f, 1)).unwrap().request_id;
        let own_draft = f.gate.add_to_basket(&moderator, ship(&f, 1)).unwrap().request_id;

        let seen: Vec<_> = f
            .gate
            .list_requests(&moderator, RequestFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(seen, vec![formed, own_draft]);

        assert!(f.gate.get_request(&moderator, formed).is_ok());
        assert!(matches!(
            f.gate.get_request(&moderator, bobs_draft),
            Err(BerthError::Forbidden(_))
        ));

        let alices: Vec<_> = f
            .gate
            .list_requests(&alice, RequestFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(alices, vec![formed]);
    }

    #[test]
    fn test_basket_and_profile() {
        let f = fixture();
        let alice = account(&f, "alice", Role::Creator);
        assert_eq!(f.gate.basket(&alice).unwrap(), BasketView::empty());

        let ship_id = ship(&f, 2);
        f.gate.add_to_basket(&alice, ship_id).unwrap();
        f.gate.add_to_basket(&alice, ship_id).unwrap();
        assert_eq!(f.gate.basket(&alice).unwrap().ships_count, 2);

        let updated = f
            .gate
            .update_profile(
                &alice,
                &ProfileUpdate {
                    full_name: Some("Alice Liddell".into()),
                    contacts: None,
                },
            )
            .unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(f.gate.profile(&alice).unwrap().login, "alice");
    }

    #[test]
    fn test_ensure_account_is_idempotent() {
        let f = fixture();
        let spec = AccountSpec {
            login: "harbour-master",
            password: "moderate-me",
            full_name: "Harbour Master",
            contacts: "",
            role: Role::Moderator,
        };

        assert!(f.gate.ensure_account(&spec).unwrap());
        assert!(!f.gate.ensure_account(&spec).unwrap());

        let audits = f.store.get_recent_audits(10).unwrap();
        let registrations = audits
            .iter()
            .filter(|a| matches!(a.event, AuditEventType::UserRegistered { .. }))
            .count();
        assert_eq!(registrations, 1);
    }
}
