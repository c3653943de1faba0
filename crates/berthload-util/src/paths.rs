//! Default paths for berthload components
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/berthload/config.toml` or `~/.config/berthload/config.toml`
//! - Data: `$XDG_DATA_HOME/berthload` or `~/.local/share/berthload`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const BERTHLOAD_CONFIG_ENV: &str = "BERTHLOAD_CONFIG";

/// Environment variable for overriding the data directory
pub const BERTHLOAD_DATA_DIR_ENV: &str = "BERTHLOAD_DATA_DIR";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "berthload.db";

const APP_DIR: &str = "berthload";
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$BERTHLOAD_CONFIG` (if set)
/// 2. `$XDG_CONFIG_HOME/berthload/config.toml`
/// 3. `~/.config/berthload/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(BERTHLOAD_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$BERTHLOAD_DATA_DIR` (if set)
/// 2. `$XDG_DATA_HOME/berthload`
/// 3. `~/.local/share/berthload`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(BERTHLOAD_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking BERTHLOAD_DATA_DIR.
/// Used for config defaults where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
