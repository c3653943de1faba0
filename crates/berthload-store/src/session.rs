//! Session key/value store
//!
//! Login state lives outside the relational store, in a TTL key/value space
//! with two key families: a session hash per session id and a token entry
//! per user. Writes to both go through [`SessionStore::apply`] so a session
//! and its token index never disagree.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::{StoreError, StoreResult};

/// One write in an atomic session batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    /// Plain string value with a time-to-live
    Set {
        key: String,
        value: String,
        ttl: Duration,
    },
    /// Hash value (replaces any previous fields) with a time-to-live
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
        ttl: Duration,
    },
    /// Remove a key of either kind; absent keys are ignored
    Del { key: String },
}

/// TTL key/value store holding sessions
pub trait SessionStore: Send + Sync {
    /// Apply all operations atomically, in order
    fn apply(&self, ops: Vec<SessionOp>) -> StoreResult<()>;

    /// Apply `ops` atomically only while the plain value at `watch` still
    /// equals `expected` (`None` meaning absent). Returns whether they were
    /// applied.
    fn apply_if(
        &self,
        watch: &str,
        expected: Option<&str>,
        ops: Vec<SessionOp>,
    ) -> StoreResult<bool>;

    /// Read a plain value; `None` if absent or expired
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Read all hash fields; `None` if absent or expired
    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.apply(vec![SessionOp::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        }])
    }

    fn hash_set(&self, key: &str, fields: Vec<(String, String)>, ttl: Duration) -> StoreResult<()> {
        self.apply(vec![SessionOp::HashSet {
            key: key.to_string(),
            fields,
            ttl,
        }])
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        self.apply(vec![SessionOp::Del {
            key: key.to_string(),
        }])
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
enum Value {
    Plain(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process session store. Expired entries are dropped lazily on read and
/// by [`MemorySessionStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, "Purged expired session entries");
        }
        Ok(removed)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

fn write_ops(entries: &mut HashMap<String, Entry>, ops: Vec<SessionOp>, now: Instant) {
    for op in ops {
        match op {
            SessionOp::Set { key, value, ttl } => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Plain(value),
                        expires_at: now + ttl,
                    },
                );
            }
            SessionOp::HashSet { key, fields, ttl } => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Hash(fields.into_iter().collect()),
                        expires_at: now + ttl,
                    },
                );
            }
            SessionOp::Del { key } => {
                entries.remove(&key);
            }
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn apply(&self, ops: Vec<SessionOp>) -> StoreResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        write_ops(&mut entries, ops, Instant::now());
        Ok(())
    }

    fn apply_if(
        &self,
        watch: &str,
        expected: Option<&str>,
        ops: Vec<SessionOp>,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();

        let current = match entries.get(watch) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Plain(value) => Some(value.as_str()),
                Value::Hash(_) => {
                    return Err(StoreError::Database(format!(
                        "key '{watch}' holds a hash, not a string"
                    )));
                }
            },
            _ => None,
        };
        if current != expected {
            trace!(key = watch, "Watched session key changed, batch skipped");
            return Ok(false);
        }

        write_ops(&mut entries, ops, now);
        Ok(true)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.live_value(key)? {
            Some(Value::Plain(value)) => Ok(Some(value)),
            Some(Value::Hash(_)) => Err(StoreError::Database(format!(
                "key '{key}' holds a hash, not a string"
            ))),
            None => Ok(None),
        }
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        match self.live_value(key)? {
            Some(Value::Hash(fields)) => Ok(Some(fields)),
            Some(Value::Plain(_)) => Err(StoreError::Database(format!(
                "key '{key}' holds a string, not a hash"
            ))),
            None => Ok(None),
        }
    }

    fn is_healthy(&self) -> bool {
        self.entries.lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_set_get_del() {
        let store = MemorySessionStore::new();
        store.set("token:1", "abc", HOUR).unwrap();
        assert_eq!(store.get("token:1").unwrap().as_deref(), Some("abc"));

        store.del("token:1").unwrap();
        assert_eq!(store.get("token:1").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_hash_round_trip() {
        let store = MemorySessionStore::new();
        store
            .hash_set(
                "session:s1",
                vec![
                    ("user_id".into(), "7".into()),
                    ("role".into(), "creator".into()),
                ],
                HOUR,
            )
            .unwrap();

        let fields = store.hash_get_all("session:s1").unwrap().unwrap();
        assert_eq!(fields.get("user_id").map(String::as_str), Some("7"));
        assert_eq!(fields.get("role").map(String::as_str), Some("creator"));

        // Wrong-kind reads are errors, not silent misses
        assert!(store.get("session:s1").is_err());
    }

    #[test]
    fn test_batch_applies_in_order() {
        let store = MemorySessionStore::new();
        store.set("token:1", "old", HOUR).unwrap();

        store
            .apply(vec![
                SessionOp::Del {
                    key: "token:1".into(),
                },
                SessionOp::Set {
                    key: "token:1".into(),
                    value: "new".into(),
                    ttl: HOUR,
                },
                SessionOp::HashSet {
                    key: "session:s2".into(),
                    fields: vec![("user_id".into(), "1".into())],
                    ttl: HOUR,
                },
            ])
            .unwrap();

        assert_eq!(store.get("token:1").unwrap().as_deref(), Some("new"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_conditional_batch_checks_watched_key() {
        let store = MemorySessionStore::new();
        let claim = |value: &str| {
            vec![SessionOp::Set {
                key: "token:1".into(),
                value: value.into(),
                ttl: HOUR,
            }]
        };

        assert!(store.apply_if("token:1", None, claim("first")).unwrap());
        // Someone else already claimed the key
        assert!(!store.apply_if("token:1", None, claim("second")).unwrap());
        assert_eq!(store.get("token:1").unwrap().as_deref(), Some("first"));

        assert!(store.apply_if("token:1", Some("first"), claim("third")).unwrap());
        assert_eq!(store.get("token:1").unwrap().as_deref(), Some("third"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entries_vanish() {
        let store = MemorySessionStore::new();
        store.set("short", "x", Duration::ZERO).unwrap();
        store.set("long", "y", HOUR).unwrap();

        assert_eq!(store.get("short").unwrap(), None);
        assert_eq!(store.len(), 1);

        store.set("short", "x", Duration::ZERO).unwrap();
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.get("long").unwrap().as_deref(), Some("y"));
    }
}
