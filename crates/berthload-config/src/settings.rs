//! Validated settings structures

use crate::schema::{RawAccount, RawAuthConfig, RawConfig, RawServerConfig, RawShip};
use berthload_api::ShipSpec;
use berthload_util::default_data_dir;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default token and session lifetime
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default name of the cookie carrying the token
pub const DEFAULT_COOKIE_NAME: &str = "jwt";

/// Validated settings ready for use by the service
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub moderators: Vec<SeedAccount>,
    pub ships: Vec<ShipSpec>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            server: ServerSettings::from_raw(raw.server),
            auth: AuthSettings::from_raw(raw.auth),
            moderators: raw.moderators.into_iter().map(SeedAccount::from_raw).collect(),
            ships: raw.ships.into_iter().map(convert_ship).collect(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
}

impl ServerSettings {
    fn from_raw(raw: RawServerConfig) -> Self {
        let default_bind = SocketAddr::from(([127, 0, 0, 1], 8080));
        Self {
            bind: raw
                .bind
                .and_then(|b| b.parse().ok())
                .unwrap_or(default_bind),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

/// Token and session settings
#[derive(Clone)]
pub struct AuthSettings {
    pub signing_key: String,
    pub session_ttl: Duration,
    pub cookie_name: String,
}

impl AuthSettings {
    /// Settings with the given key and default lifetime and cookie name
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            session_ttl: DEFAULT_SESSION_TTL,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    fn from_raw(raw: RawAuthConfig) -> Self {
        Self {
            signing_key: raw.signing_key.unwrap_or_default(),
            session_ttl: raw
                .session_ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SESSION_TTL),
            cookie_name: raw
                .cookie_name
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("signing_key", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

/// Account ensured at startup
#[derive(Clone)]
pub struct SeedAccount {
    pub login: String,
    pub password: String,
    pub full_name: String,
    pub contacts: String,
}

impl SeedAccount {
    fn from_raw(raw: RawAccount) -> Self {
        Self {
            login: raw.login,
            password: raw.password,
            full_name: raw.full_name.unwrap_or_default(),
            contacts: raw.contacts.unwrap_or_default(),
        }
    }
}

impl fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedAccount")
            .field("login", &self.login)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

fn convert_ship(raw: RawShip) -> ShipSpec {
    ShipSpec {
        name: raw.name,
        capacity: raw.capacity,
        length: raw.length,
        width: raw.width,
        draft: raw.draft,
        cranes: raw.cranes,
        containers: raw.containers,
        description: raw.description.unwrap_or_default(),
        photo_url: raw.photo_url,
    }
}
