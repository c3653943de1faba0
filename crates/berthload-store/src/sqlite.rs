//! SQLite-based store implementation

use berthload_api::{
    CompletionOutcome, DeleteMode, RequestFields, RequestFilter, RequestStatus, Role, Ship,
    ShipAssociation, ShipFilter, ShipLine, ShipSpec, ShippingRequest, MAX_SHIP_QUANTITY,
};
use berthload_util::{format_timestamp, parse_timestamp, RequestId, ShipId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    AuditEvent, AuditEventType, AuditLog, Completion, Guarded, LoadingEstimator, NewUser,
    RequestStore, ShipCatalog, Store, StoreError, StoreResult, UserRecord, UserStore,
};

/// How long a connection waits on another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REQUEST_COLUMNS: &str = "id, owner_user_id, status, creation_date, formation_date, \
     completion_date, moderator_id, containers_20ft_count, containers_40ft_count, comment, \
     loading_time";

const SHIP_COLUMNS: &str =
    "id, name, capacity, length, width, draft, cranes, containers, description, photo_url, is_active";

const USER_COLUMNS: &str = "id, login, password_hash, full_name, contacts, role, created_at";

/// SQLite-based store
///
/// One connection per store. Several stores (or processes) may open the same
/// file; invariants are enforced by the schema and by conditional updates,
/// not by the mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                contacts TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL CHECK (role IN ('guest', 'creator', 'moderator')),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                capacity REAL NOT NULL DEFAULT 0,
                length REAL NOT NULL DEFAULT 0,
                width REAL NOT NULL DEFAULT 0,
                draft REAL NOT NULL DEFAULT 0,
                cranes INTEGER NOT NULL DEFAULT 0 CHECK (cranes >= 0),
                containers INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                photo_url TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_user_id INTEGER NOT NULL,
                status TEXT NOT NULL
                    CHECK (status IN ('draft', 'formed', 'completed', 'rejected', 'deleted')),
                creation_date TEXT NOT NULL,
                formation_date TEXT,
                completion_date TEXT,
                moderator_id INTEGER,
                containers_20ft_count INTEGER NOT NULL DEFAULT 0 CHECK (containers_20ft_count >= 0),
                containers_40ft_count INTEGER NOT NULL DEFAULT 0 CHECK (containers_40ft_count >= 0),
                comment TEXT NOT NULL DEFAULT '',
                loading_time REAL
            );

            -- At most one draft per user
            CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_single_draft
                ON requests(owner_user_id) WHERE status = 'draft';

            CREATE TABLE IF NOT EXISTS ship_associations (
                request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                ship_id INTEGER NOT NULL REFERENCES ships(id),
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                PRIMARY KEY (request_id, ship_id)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(creation_date, id);
            CREATE INDEX IF NOT EXISTS idx_requests_owner ON requests(owner_user_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    /// Run `op` inside an immediate transaction if the request's status is
    /// one of `allowed`.
    fn guarded<T>(
        &self,
        id: RequestId,
        allowed: &[RequestStatus],
        op: impl FnOnce(&Transaction<'_>, RequestStatus) -> StoreResult<T>,
    ) -> StoreResult<Guarded<T>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(status) = current_status(&tx, id)? else {
            return Ok(Guarded::NoSuchRequest);
        };
        if !allowed.contains(&status) {
            return Ok(Guarded::StatusMismatch(status));
        }

        let value = op(&tx, status)?;
        tx.commit()?;
        Ok(Guarded::Applied(value))
    }
}

#[derive(Debug, Error)]
#[error("invalid stored timestamp '{0}'")]
struct BadTimestamp(String);

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, BadTimestamp(raw)))
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, BadTimestamp(raw))),
        None => Ok(None),
    }
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ShippingRequest> {
    let status: String = row.get(2)?;
    Ok(ShippingRequest {
        id: RequestId::new(row.get(0)?),
        owner_user_id: UserId::new(row.get(1)?),
        status: status.parse().map_err(|e| conversion_error(2, e))?,
        creation_date: timestamp_column(row, 3)?,
        formation_date: optional_timestamp_column(row, 4)?,
        completion_date: optional_timestamp_column(row, 5)?,
        moderator_id: row.get::<_, Option<i64>>(6)?.map(UserId::new),
        containers_20ft_count: row.get(7)?,
        containers_40ft_count: row.get(8)?,
        comment: row.get(9)?,
        loading_time: row.get(10)?,
    })
}

fn ship_from_row(row: &Row<'_>) -> rusqlite::Result<Ship> {
    Ok(Ship {
        id: ShipId::new(row.get(0)?),
        name: row.get(1)?,
        capacity: row.get(2)?,
        length: row.get(3)?,
        width: row.get(4)?,
        draft: row.get(5)?,
        cranes: row.get(6)?,
        containers: row.get(7)?,
        description: row.get(8)?,
        photo_url: row.get(9)?,
        is_active: row.get(10)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role: String = row.get(5)?;
    Ok(UserRecord {
        id: UserId::new(row.get(0)?),
        login: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: row.get(3)?,
        contacts: row.get(4)?,
        role: role.parse::<Role>().map_err(|e| conversion_error(5, e))?,
        created_at: timestamp_column(row, 6)?,
    })
}

fn current_status(conn: &Connection, id: RequestId) -> StoreResult<Option<RequestStatus>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM requests WHERE id = ?1",
            [id.get()],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| {
        s.parse()
            .map_err(|e: berthload_api::UnknownVariant| StoreError::Serialization(e.to_string()))
    })
    .transpose()
}

fn load_request(conn: &Connection, id: RequestId) -> StoreResult<Option<ShippingRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
    Ok(conn.query_row(&sql, [id.get()], request_from_row).optional()?)
}

fn require_request(conn: &Connection, id: RequestId) -> StoreResult<ShippingRequest> {
    load_request(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("request {id}")))
}

fn load_lines(conn: &Connection, id: RequestId) -> StoreResult<Vec<ShipLine>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT s.id, s.name, s.cranes, s.capacity, s.photo_url, a.quantity
        FROM ship_associations a
        JOIN ships s ON s.id = a.ship_id
        WHERE a.request_id = ?1
        ORDER BY s.id
        "#,
    )?;

    let lines = stmt
        .query_map([id.get()], |row| {
            Ok(ShipLine {
                ship_id: ShipId::new(row.get(0)?),
                name: row.get(1)?,
                cranes: row.get(2)?,
                capacity: row.get(3)?,
                photo_url: row.get(4)?,
                quantity: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines)
}

fn load_association(
    conn: &Connection,
    id: RequestId,
    ship_id: ShipId,
) -> StoreResult<Option<ShipAssociation>> {
    let quantity: Option<i64> = conn
        .query_row(
            "SELECT quantity FROM ship_associations WHERE request_id = ?1 AND ship_id = ?2",
            params![id.get(), ship_id.get()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(quantity.map(|quantity| ShipAssociation {
        request_id: id,
        ship_id,
        quantity,
    }))
}

fn load_ship(conn: &Connection, id: ShipId) -> StoreResult<Option<Ship>> {
    let sql = format!("SELECT {SHIP_COLUMNS} FROM ships WHERE id = ?1");
    Ok(conn.query_row(&sql, [id.get()], ship_from_row).optional()?)
}

fn load_user(conn: &Connection, id: UserId) -> StoreResult<Option<UserRecord>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id.get()], user_from_row).optional()?)
}

impl ShipCatalog for SqliteStore {
    fn get_ship(&self, id: ShipId) -> StoreResult<Option<Ship>> {
        let conn = self.conn()?;
        load_ship(&conn, id)
    }

    fn list_ships(&self, filter: &ShipFilter) -> StoreResult<Vec<Ship>> {
        let conn = self.conn()?;
        let name = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let sql = format!(
            r#"
            SELECT {SHIP_COLUMNS} FROM ships
            WHERE (?1 IS NULL OR instr(lower(name), lower(?1)) > 0)
              AND (?2 IS NULL OR capacity >= ?2)
              AND (?3 OR is_active = 1)
            ORDER BY id
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let ships = stmt
            .query_map(
                params![name, filter.min_capacity, filter.include_inactive],
                ship_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ships)
    }

    fn create_ship(&self, spec: &ShipSpec) -> StoreResult<Ship> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO ships
                (name, capacity, length, width, draft, cranes, containers, description, photo_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                spec.name,
                spec.capacity,
                spec.length,
                spec.width,
                spec.draft,
                spec.cranes,
                spec.containers,
                spec.description,
                spec.photo_url,
            ],
        )?;

        let id = ShipId::new(conn.last_insert_rowid());
        debug!(ship_id = %id, name = %spec.name, "Ship created");
        load_ship(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("ship {id}")))
    }

    fn update_ship(&self, id: ShipId, spec: &ShipSpec) -> StoreResult<Option<Ship>> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE ships SET
                name = ?2, capacity = ?3, length = ?4, width = ?5, draft = ?6,
                cranes = ?7, containers = ?8, description = ?9, photo_url = ?10
            WHERE id = ?1
            "#,
            params![
                id.get(),
                spec.name,
                spec.capacity,
                spec.length,
                spec.width,
                spec.draft,
                spec.cranes,
                spec.containers,
                spec.description,
                spec.photo_url,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        load_ship(&conn, id)
    }

    fn set_ship_active(&self, id: ShipId, active: bool) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE ships SET is_active = ?2 WHERE id = ?1",
            params![id.get(), active],
        )?;
        debug!(ship_id = %id, active, "Ship activity set");
        Ok(changed > 0)
    }

    fn count_ships(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ships", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

impl RequestStore for SqliteStore {
    fn find_draft(&self, owner: UserId) -> StoreResult<Option<ShippingRequest>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE owner_user_id = ?1 AND status = ?2");
        Ok(conn
            .query_row(
                &sql,
                params![owner.get(), RequestStatus::Draft.as_str()],
                request_from_row,
            )
            .optional()?)
    }

    fn insert_draft(
        &self,
        owner: UserId,
        created_at: DateTime<Utc>,
    ) -> StoreResult<ShippingRequest> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO requests (owner_user_id, status, creation_date) VALUES (?1, ?2, ?3)",
            params![
                owner.get(),
                RequestStatus::Draft.as_str(),
                format_timestamp(&created_at)
            ],
        )?;

        let id = RequestId::new(conn.last_insert_rowid());
        debug!(request_id = %id, owner = %owner, "Draft inserted");
        require_request(&conn, id)
    }

    fn get_request(&self, id: RequestId) -> StoreResult<Option<ShippingRequest>> {
        let conn = self.conn()?;
        load_request(&conn, id)
    }

    fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<ShippingRequest>> {
        let conn = self.conn()?;
        let start = filter.created.start().map(|d| format_timestamp(&d));
        let end = filter.created.end_exclusive().map(|d| format_timestamp(&d));

        let sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM requests
            WHERE status != ?5
              AND (?1 IS NULL OR creation_date >= ?1)
              AND (?2 IS NULL OR creation_date < ?2)
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR owner_user_id = ?4)
            ORDER BY creation_date, id
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let requests = stmt
            .query_map(
                params![
                    start,
                    end,
                    filter.status.map(|s| s.as_str()),
                    filter.owner.map(|o| o.get()),
                    RequestStatus::Deleted.as_str(),
                ],
                request_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(requests)
    }

    fn ship_lines(&self, id: RequestId) -> StoreResult<Vec<ShipLine>> {
        let conn = self.conn()?;
        load_lines(&conn, id)
    }

    fn update_fields(
        &self,
        id: RequestId,
        fields: &RequestFields,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<ShippingRequest>> {
        self.guarded(id, allowed, |tx, status| {
            tx.execute(
                r#"
                UPDATE requests SET
                    containers_20ft_count = COALESCE(?2, containers_20ft_count),
                    containers_40ft_count = COALESCE(?3, containers_40ft_count),
                    comment = COALESCE(?4, comment)
                WHERE id = ?1 AND status = ?5
                "#,
                params![
                    id.get(),
                    fields.containers_20ft_count,
                    fields.containers_40ft_count,
                    fields.comment,
                    status.as_str(),
                ],
            )?;
            require_request(tx, id)
        })
    }

    fn add_ship(
        &self,
        id: RequestId,
        ship_id: ShipId,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<Option<ShipAssociation>>> {
        self.guarded(id, allowed, |tx, _| {
            let changed = tx.execute(
                r#"
                INSERT INTO ship_associations (request_id, ship_id, quantity)
                SELECT ?1, ?2, 1
                WHERE EXISTS (SELECT 1 FROM ships WHERE id = ?2 AND is_active = 1)
                ON CONFLICT (request_id, ship_id) DO UPDATE SET quantity = quantity + 1
                    WHERE quantity < ?3
                "#,
                params![id.get(), ship_id.get(), MAX_SHIP_QUANTITY],
            )?;

            if changed == 0 {
                return Ok(None);
            }
            let association = load_association(tx, id, ship_id)?;
            debug!(
                request_id = %id,
                ship_id = %ship_id,
                quantity = association.map(|a| a.quantity),
                "Ship added to request"
            );
            Ok(association)
        })
    }

    fn set_quantity(
        &self,
        id: RequestId,
        ship_id: ShipId,
        quantity: i64,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<Option<ShipAssociation>>> {
        self.guarded(id, allowed, |tx, _| {
            let changed = tx.execute(
                "UPDATE ship_associations SET quantity = ?3 WHERE request_id = ?1 AND ship_id = ?2",
                params![id.get(), ship_id.get(), quantity],
            )?;

            if changed == 0 {
                return Ok(None);
            }
            load_association(tx, id, ship_id)
        })
    }

    fn remove_ship(
        &self,
        id: RequestId,
        ship_id: ShipId,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<bool>> {
        self.guarded(id, allowed, |tx, _| {
            let changed = tx.execute(
                "DELETE FROM ship_associations WHERE request_id = ?1 AND ship_id = ?2",
                params![id.get(), ship_id.get()],
            )?;
            Ok(changed > 0)
        })
    }

    fn form_request(&self, id: RequestId, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE requests SET status = ?3, formation_date = ?2
            WHERE id = ?1
              AND status = ?4
              AND (containers_20ft_count > 0 OR containers_40ft_count > 0)
              AND EXISTS (SELECT 1 FROM ship_associations WHERE request_id = ?1)
            "#,
            params![
                id.get(),
                format_timestamp(&at),
                RequestStatus::Formed.as_str(),
                RequestStatus::Draft.as_str(),
            ],
        )?;

        debug!(request_id = %id, formed = changed > 0, "Form attempted");
        Ok(changed > 0)
    }

    fn complete_request(
        &self,
        id: RequestId,
        completion: &Completion,
        estimate: LoadingEstimator<'_>,
    ) -> StoreResult<Guarded<ShippingRequest>> {
        self.guarded(id, &[RequestStatus::Formed], |tx, status| {
            let request = require_request(tx, id)?;
            let loading_time = match completion.outcome {
                CompletionOutcome::Accept => {
                    let lines = load_lines(tx, id)?;
                    Some(estimate(&request, &lines))
                }
                CompletionOutcome::Reject => None,
            };

            tx.execute(
                r#"
                UPDATE requests SET
                    status = ?2, moderator_id = ?3, completion_date = ?4, loading_time = ?5
                WHERE id = ?1 AND status = ?6
                "#,
                params![
                    id.get(),
                    completion.outcome.target_status().as_str(),
                    completion.moderator_id.get(),
                    format_timestamp(&completion.at),
                    loading_time,
                    status.as_str(),
                ],
            )?;
            require_request(tx, id)
        })
    }

    fn delete_request(
        &self,
        id: RequestId,
        mode: DeleteMode,
        allowed: &[RequestStatus],
    ) -> StoreResult<Guarded<()>> {
        self.guarded(id, allowed, |tx, status| {
            tx.execute(
                "DELETE FROM ship_associations WHERE request_id = ?1",
                [id.get()],
            )?;

            match mode {
                DeleteMode::Hard => tx.execute(
                    "DELETE FROM requests WHERE id = ?1 AND status = ?2",
                    params![id.get(), status.as_str()],
                )?,
                DeleteMode::Soft => tx.execute(
                    "UPDATE requests SET status = ?3 WHERE id = ?1 AND status = ?2",
                    params![id.get(), status.as_str(), RequestStatus::Deleted.as_str()],
                )?,
            };

            debug!(request_id = %id, ?mode, "Request deleted");
            Ok(())
        })
    }
}

impl UserStore for SqliteStore {
    fn create_user(&self, user: &NewUser) -> StoreResult<UserRecord> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (login, password_hash, full_name, contacts, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user.login,
                user.password_hash,
                user.full_name,
                user.contacts,
                user.role.as_str(),
                format_timestamp(&berthload_util::now()),
            ],
        )?;

        let id = UserId::new(conn.last_insert_rowid());
        debug!(user_id = %id, login = %user.login, role = %user.role, "User created");
        load_user(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn()?;
        load_user(&conn, id)
    }

    fn find_user_by_login(&self, login: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE login = ?1");
        Ok(conn.query_row(&sql, [login], user_from_row).optional()?)
    }

    fn update_profile(
        &self,
        id: UserId,
        full_name: Option<&str>,
        contacts: Option<&str>,
    ) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE users SET
                full_name = COALESCE(?2, full_name),
                contacts = COALESCE(?3, contacts)
            WHERE id = ?1
            "#,
            params![id.get(), full_name, contacts],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        load_user(&conn, id)
    }
}

impl AuditLog for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?1, ?2)",
            params![format_timestamp(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp = timestamp_column(row, 1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;
            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }
}

impl Store for SqliteStore {
    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berthload_util::{parse_date, DateRange};
    use chrono::TimeZone;

    const EDITABLE: &[RequestStatus] = &[RequestStatus::Draft, RequestStatus::Formed];

    fn spec(name: &str, cranes: i64) -> ShipSpec {
        ShipSpec {
            name: name.into(),
            capacity: 1_000.0 * cranes as f64,
            cranes,
            ..Default::default()
        }
    }

    fn draft_with_ship(store: &SqliteStore, owner: i64) -> (ShippingRequest, Ship) {
        let ship = store.create_ship(&spec(&format!("Ship {owner}"), 2)).unwrap();
        let draft = store.insert_draft(UserId::new(owner), berthload_util::now()).unwrap();
        store
            .add_ship(draft.id, ship.id, &[RequestStatus::Draft])
            .unwrap();
        (draft, ship)
    }

    fn set_containers(store: &SqliteStore, id: RequestId, c20: i64, c40: i64) {
        let fields = RequestFields {
            containers_20ft_count: Some(c20),
            containers_40ft_count: Some(c40),
            comment: None,
        };
        store.update_fields(id, &fields, EDITABLE).unwrap();
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::RequestFormed {
                request_id: RequestId::new(4),
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].event,
            AuditEventType::RequestFormed { request_id } if request_id == RequestId::new(4)
        ));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_single_draft_per_owner() {
        let store = SqliteStore::in_memory().unwrap();
        let owner = UserId::new(1);

        let draft = store.insert_draft(owner, berthload_util::now()).unwrap();
        assert_eq!(draft.status, RequestStatus::Draft);
        assert_eq!(store.find_draft(owner).unwrap().unwrap().id, draft.id);

        let second = store.insert_draft(owner, berthload_util::now());
        assert!(matches!(second, Err(StoreError::Constraint(_))));

        // Other owners are unaffected
        assert!(store.insert_draft(UserId::new(2), berthload_util::now()).is_ok());
    }

    #[test]
    fn test_draft_slot_frees_after_formation() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, _) = draft_with_ship(&store, 1);
        set_containers(&store, draft.id, 1, 0);

        assert!(store.form_request(draft.id, berthload_util::now()).unwrap());
        assert!(store.find_draft(UserId::new(1)).unwrap().is_none());
        assert!(store.insert_draft(UserId::new(1), berthload_util::now()).is_ok());
    }

    #[test]
    fn test_add_ship_increments_single_row() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, ship) = draft_with_ship(&store, 1);

        let again = store
            .add_ship(draft.id, ship.id, &[RequestStatus::Draft])
            .unwrap();
        assert_eq!(
            again,
            Guarded::Applied(Some(ShipAssociation {
                request_id: draft.id,
                ship_id: ship.id,
                quantity: 2,
            }))
        );

        let lines = store.ship_lines(draft.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].cranes, 2);
    }

    #[test]
    fn test_add_inactive_or_missing_ship() {
        let store = SqliteStore::in_memory().unwrap();
        let ship = store.create_ship(&spec("Laid up", 1)).unwrap();
        store.set_ship_active(ship.id, false).unwrap();
        let draft = store.insert_draft(UserId::new(1), berthload_util::now()).unwrap();

        let inactive = store.add_ship(draft.id, ship.id, &[RequestStatus::Draft]).unwrap();
        assert_eq!(inactive, Guarded::Applied(None));

        let missing = store
            .add_ship(draft.id, ShipId::new(999), &[RequestStatus::Draft])
            .unwrap();
        assert_eq!(missing, Guarded::Applied(None));
        assert!(store.ship_lines(draft.id).unwrap().is_empty());
    }

    #[test]
    fn test_add_ship_stops_at_quantity_cap() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, ship) = draft_with_ship(&store, 1);
        store
            .set_quantity(draft.id, ship.id, MAX_SHIP_QUANTITY, EDITABLE)
            .unwrap();

        let capped = store.add_ship(draft.id, ship.id, &[RequestStatus::Draft]).unwrap();
        assert_eq!(capped, Guarded::Applied(None));
        assert_eq!(store.ship_lines(draft.id).unwrap()[0].quantity, MAX_SHIP_QUANTITY);
    }

    #[test]
    fn test_guard_reports_status_and_missing_request() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, ship) = draft_with_ship(&store, 1);
        set_containers(&store, draft.id, 0, 2);
        store.form_request(draft.id, berthload_util::now()).unwrap();

        let result = store.add_ship(draft.id, ship.id, &[RequestStatus::Draft]).unwrap();
        assert_eq!(result, Guarded::StatusMismatch(RequestStatus::Formed));

        let result = store
            .remove_ship(RequestId::new(404), ship.id, EDITABLE)
            .unwrap();
        assert_eq!(result, Guarded::NoSuchRequest);
    }

    #[test]
    fn test_remove_ship_is_absolute_and_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, ship) = draft_with_ship(&store, 1);
        store.add_ship(draft.id, ship.id, &[RequestStatus::Draft]).unwrap();

        assert_eq!(
            store.remove_ship(draft.id, ship.id, EDITABLE).unwrap(),
            Guarded::Applied(true)
        );
        assert_eq!(
            store.remove_ship(draft.id, ship.id, EDITABLE).unwrap(),
            Guarded::Applied(false)
        );
        assert!(store.ship_lines(draft.id).unwrap().is_empty());
    }

    #[test]
    fn test_set_quantity() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, ship) = draft_with_ship(&store, 1);

        let updated = store.set_quantity(draft.id, ship.id, 5, EDITABLE).unwrap();
        assert!(matches!(updated, Guarded::Applied(Some(a)) if a.quantity == 5));

        let missing = store
            .set_quantity(draft.id, ShipId::new(77), 2, EDITABLE)
            .unwrap();
        assert_eq!(missing, Guarded::Applied(None));

        // The schema refuses non-positive quantities even if a caller skips validation
        let zero = store.set_quantity(draft.id, ship.id, 0, EDITABLE);
        assert!(matches!(zero, Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_form_requires_ships_and_containers() {
        let store = SqliteStore::in_memory().unwrap();
        let empty = store.insert_draft(UserId::new(1), berthload_util::now()).unwrap();
        set_containers(&store, empty.id, 3, 0);
        assert!(!store.form_request(empty.id, berthload_util::now()).unwrap());

        let (draft, _) = draft_with_ship(&store, 2);
        assert!(!store.form_request(draft.id, berthload_util::now()).unwrap());

        set_containers(&store, draft.id, 1, 0);
        assert!(store.form_request(draft.id, berthload_util::now()).unwrap());

        let formed = store.get_request(draft.id).unwrap().unwrap();
        assert_eq!(formed.status, RequestStatus::Formed);
        assert!(formed.formation_date.is_some());

        // Second attempt finds no draft to swap
        assert!(!store.form_request(draft.id, berthload_util::now()).unwrap());
    }

    #[test]
    fn test_complete_freezes_estimate() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, _) = draft_with_ship(&store, 1);
        set_containers(&store, draft.id, 4, 0);
        store.form_request(draft.id, berthload_util::now()).unwrap();

        let completion = Completion {
            moderator_id: UserId::new(9),
            outcome: CompletionOutcome::Accept,
            at: berthload_util::now(),
        };
        let estimator = |req: &ShippingRequest, lines: &[ShipLine]| {
            assert_eq!(lines.len(), 1);
            req.containers_20ft_count as f64
        };

        let result = store.complete_request(draft.id, &completion, &estimator).unwrap();
        let Guarded::Applied(completed) = result else {
            panic!("expected completion, got {result:?}");
        };
        assert_eq!(completed.status, RequestStatus::Completed);
        assert_eq!(completed.loading_time, Some(4.0));
        assert_eq!(completed.moderator_id, Some(UserId::new(9)));
        assert!(completed.completion_date.is_some());

        let again = store.complete_request(draft.id, &completion, &estimator).unwrap();
        assert_eq!(again, Guarded::StatusMismatch(RequestStatus::Completed));
    }

    #[test]
    fn test_reject_leaves_loading_time_unset() {
        let store = SqliteStore::in_memory().unwrap();
        let (draft, _) = draft_with_ship(&store, 1);
        set_containers(&store, draft.id, 0, 1);
        store.form_request(draft.id, berthload_util::now()).unwrap();

        let completion = Completion {
            moderator_id: UserId::new(9),
            outcome: CompletionOutcome::Reject,
            at: berthload_util::now(),
        };
        let result = store
            .complete_request(draft.id, &completion, &|_, _| unreachable!())
            .unwrap();

        let Guarded::Applied(rejected) = result else {
            panic!("expected rejection, got {result:?}");
        };
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.loading_time, None);
    }

    #[test]
    fn test_hard_and_soft_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let (hard, _) = draft_with_ship(&store, 1);
        let (soft, _) = draft_with_ship(&store, 2);

        assert_eq!(
            store.delete_request(hard.id, DeleteMode::Hard, EDITABLE).unwrap(),
            Guarded::Applied(())
        );
        assert!(store.get_request(hard.id).unwrap().is_none());
        assert!(store.ship_lines(hard.id).unwrap().is_empty());

        store.delete_request(soft.id, DeleteMode::Soft, EDITABLE).unwrap();
        let tombstone = store.get_request(soft.id).unwrap().unwrap();
        assert_eq!(tombstone.status, RequestStatus::Deleted);
        assert!(store.ship_lines(soft.id).unwrap().is_empty());

        assert!(store.list_requests(&RequestFilter::default()).unwrap().is_empty());

        let again = store.delete_request(soft.id, DeleteMode::Soft, EDITABLE).unwrap();
        assert_eq!(again, Guarded::StatusMismatch(RequestStatus::Deleted));
    }

    #[test]
    fn test_list_filters_and_ordering() {
        let store = SqliteStore::in_memory().unwrap();
        let jan = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2025, 2, 15, 10, 0, 0).unwrap();
        let mar = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();

        let r_feb = store.insert_draft(UserId::new(2), feb).unwrap();
        let r_jan = store.insert_draft(UserId::new(1), jan).unwrap();
        let r_mar = store.insert_draft(UserId::new(3), mar).unwrap();

        let all = store.list_requests(&RequestFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![r_jan.id, r_feb.id, r_mar.id]);

        let filter = RequestFilter {
            created: DateRange::new(parse_date("2025-02-01"), parse_date("2025-03-15")),
            ..Default::default()
        };
        let ranged = store.list_requests(&filter).unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[0].id, r_feb.id);

        let filter = RequestFilter {
            owner: Some(UserId::new(3)),
            status: Some(RequestStatus::Draft),
            ..Default::default()
        };
        assert_eq!(store.list_requests(&filter).unwrap()[0].id, r_mar.id);

        let filter = RequestFilter {
            status: Some(RequestStatus::Formed),
            ..Default::default()
        };
        assert!(store.list_requests(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_ship_catalog_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let big = store.create_ship(&spec("Ever Ace", 6)).unwrap();
        let small = store.create_ship(&spec("Feeder Star", 1)).unwrap();
        store.set_ship_active(small.id, false).unwrap();

        let active = store.list_ships(&ShipFilter::default()).unwrap();
        assert_eq!(active, vec![big.clone()]);

        let all = store
            .list_ships(&ShipFilter {
                include_inactive: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.len(), 2);

        let by_name = store
            .list_ships(&ShipFilter {
                name: Some("ever".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name[0].id, big.id);

        let by_capacity = store
            .list_ships(&ShipFilter {
                min_capacity: Some(10_000.0),
                ..Default::default()
            })
            .unwrap();
        assert!(by_capacity.is_empty());

        let mut edited = spec("Ever Ace II", 8);
        edited.photo_url = Some("https://img.example/ace.png".into());
        let updated = store.update_ship(big.id, &edited).unwrap().unwrap();
        assert_eq!(updated.cranes, 8);
        assert_eq!(store.count_ships().unwrap(), 2);
        assert!(store.update_ship(ShipId::new(99), &edited).unwrap().is_none());
    }

    #[test]
    fn test_users() {
        let store = SqliteStore::in_memory().unwrap();
        let new_user = NewUser {
            login: "alice".into(),
            password_hash: "$argon2id$stub".into(),
            full_name: "Alice".into(),
            contacts: String::new(),
            role: Role::Creator,
        };

        let alice = store.create_user(&new_user).unwrap();
        assert_eq!(alice.role, Role::Creator);
        assert_eq!(store.find_user_by_login("ALICE").unwrap().unwrap().id, alice.id);

        let duplicate = store.create_user(&NewUser {
            login: "Alice".into(),
            ..new_user
        });
        assert!(matches!(duplicate, Err(StoreError::Constraint(_))));

        let updated = store
            .update_profile(alice.id, None, Some("+7 900 000 00 00"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Alice");
        assert_eq!(updated.contacts, "+7 900 000 00 00");
        assert_eq!(updated.view().login, "alice");
    }

    #[test]
    fn test_two_connections_share_draft_constraint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berthload.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        let draft = first.insert_draft(UserId::new(5), berthload_util::now()).unwrap();
        let lost = second.insert_draft(UserId::new(5), berthload_util::now());

        assert!(matches!(lost, Err(StoreError::Constraint(_))));
        assert_eq!(second.find_draft(UserId::new(5)).unwrap().unwrap().id, draft.id);
    }
}
