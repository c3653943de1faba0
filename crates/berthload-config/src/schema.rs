//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// HTTP server settings
    #[serde(default)]
    pub server: RawServerConfig,

    /// Token and session settings
    #[serde(default)]
    pub auth: RawAuthConfig,

    /// Moderator accounts created at startup when missing
    #[serde(default)]
    pub moderators: Vec<RawAccount>,

    /// Ships inserted at startup when the catalog is empty
    #[serde(default)]
    pub ships: Vec<RawShip>,
}

/// Server-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServerConfig {
    /// Listen address (default: 127.0.0.1:8080)
    pub bind: Option<String>,

    /// Data directory for the SQLite database
    pub data_dir: Option<PathBuf>,
}

/// Authentication settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAuthConfig {
    /// HS256 signing secret. `BERTHLOAD_SIGNING_KEY` takes precedence.
    pub signing_key: Option<String>,

    /// Token and session lifetime (default: 24h)
    pub session_ttl_seconds: Option<u64>,

    /// Cookie carrying the token (default: "jwt")
    pub cookie_name: Option<String>,
}

/// Seed account
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAccount {
    pub login: String,
    pub password: String,
    pub full_name: Option<String>,
    pub contacts: Option<String>,
}

/// Seed catalog ship
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawShip {
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
    pub description: Option<String>,
    pub photo_url: Option<String>,
}
