//! Configuration validation

use crate::schema::{RawAccount, RawConfig, RawShip};
use berthload_api::MAX_SHIP_CRANES;
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

/// Shortest accepted HS256 secret, in bytes
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Shortest accepted account password
pub const MIN_PASSWORD_LEN: usize = 6;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid bind address '{value}': {message}")]
    InvalidBind { value: String, message: String },

    #[error("Auth config error: {0}")]
    AuthError(String),

    #[error("Moderator '{login}': {message}")]
    AccountError { login: String, message: String },

    #[error("Duplicate moderator login: {0}")]
    DuplicateLogin(String),

    #[error("Ship '{name}': {message}")]
    ShipError { name: String, message: String },

    #[error("Duplicate ship name: {0}")]
    DuplicateShipName(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(bind) = &config.server.bind
        && let Err(e) = bind.parse::<SocketAddr>()
    {
        errors.push(ValidationError::InvalidBind {
            value: bind.clone(),
            message: e.to_string(),
        });
    }

    errors.extend(validate_auth(config));

    let mut seen_logins = HashSet::new();
    for account in &config.moderators {
        if !seen_logins.insert(account.login.as_str()) {
            errors.push(ValidationError::DuplicateLogin(account.login.clone()));
        }
        errors.extend(validate_account(account));
    }

    let mut seen_names = HashSet::new();
    for ship in &config.ships {
        if !seen_names.insert(ship.name.to_lowercase()) {
            errors.push(ValidationError::DuplicateShipName(ship.name.clone()));
        }
        errors.extend(validate_ship(ship));
    }

    errors
}

fn validate_auth(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let auth = &config.auth;

    match &auth.signing_key {
        None => errors.push(ValidationError::AuthError(
            "signing_key is required (or set BERTHLOAD_SIGNING_KEY)".into(),
        )),
        Some(key) if key.len() < MIN_SIGNING_KEY_LEN => {
            errors.push(ValidationError::AuthError(format!(
                "signing_key must be at least {} bytes",
                MIN_SIGNING_KEY_LEN
            )));
        }
        Some(_) => {}
    }

    if auth.session_ttl_seconds == Some(0) {
        errors.push(ValidationError::AuthError(
            "session_ttl_seconds must be positive".into(),
        ));
    }

    if let Some(name) = &auth.cookie_name
        && !is_valid_cookie_name(name)
    {
        errors.push(ValidationError::AuthError(format!(
            "cookie_name '{}' is not a valid cookie token",
            name
        )));
    }

    errors
}

fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn validate_account(account: &RawAccount) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let login = account.login.clone();

    if account.login.trim().is_empty() {
        errors.push(ValidationError::AccountError {
            login: login.clone(),
            message: "login cannot be empty".into(),
        });
    }

    if account.password.len() < MIN_PASSWORD_LEN {
        errors.push(ValidationError::AccountError {
            login,
            message: format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        });
    }

    errors
}

fn validate_ship(ship: &RawShip) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut fail = |message: String| {
        errors.push(ValidationError::ShipError {
            name: ship.name.clone(),
            message,
        })
    };

    if ship.name.trim().is_empty() {
        fail("name cannot be empty".into());
    }

    for (field, value) in [
        ("capacity", ship.capacity),
        ("length", ship.length),
        ("width", ship.width),
        ("draft", ship.draft),
    ] {
        if !value.is_finite() || value < 0.0 {
            fail(format!("{} must be a non-negative number", field));
        }
    }

    if ship.cranes < 0 {
        fail("cranes cannot be negative".into());
    }
    if ship.cranes > MAX_SHIP_CRANES {
        fail(format!("cranes cannot exceed {}", MAX_SHIP_CRANES));
    }
    if ship.containers < 0 {
        fail("containers cannot be negative".into());
    }

    errors
}
