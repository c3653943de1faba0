//! Request extractors and shared state

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use berthload_auth::{AccessGate, Credential};
use berthload_util::{BerthError, Result};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::ApiError;

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    /// Name of the session cookie set at login
    pub cookie_name: Arc<str>,
    /// Lifetime of the session cookie
    pub cookie_ttl: Duration,
}

impl AppState {
    pub fn new(gate: Arc<AccessGate>, cookie_name: &str, cookie_ttl: Duration) -> Self {
        Self {
            gate,
            cookie_name: Arc::from(cookie_name),
            cookie_ttl,
        }
    }

    /// Run a gate call on the blocking pool
    pub async fn run<T, F>(&self, op: F) -> std::result::Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&AccessGate) -> Result<T> + Send + 'static,
    {
        let gate = self.gate.clone();
        tokio::task::spawn_blocking(move || op(&gate))
            .await
            .map_err(|e| BerthError::internal(format!("worker task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

/// The credential the caller presented, unverified
#[derive(Debug, Clone)]
pub struct Caller(pub Credential);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let cookie = cookie_value(&parts.headers, &state.cookie_name);
        // A non-ASCII header is treated as malformed rather than missing
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default());

        Ok(Caller(Credential::from_parts(
            cookie.as_deref(),
            authorization,
        )))
    }
}

/// Value of the named cookie, if the request carries it
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(name: &str, token: &str, ttl: Duration) -> String {
    format!(
        "{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; jwt=abc.def.ghi"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(cookie_value(&headers, "jwt").as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, "other").as_deref(), Some("1"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_strings() {
        let set = session_cookie("jwt", "tok", Duration::from_secs(60));
        assert!(set.starts_with("jwt=tok;"));
        assert!(set.contains("Max-Age=60"));
        assert!(expired_cookie("jwt").contains("Max-Age=0"));
    }
}
