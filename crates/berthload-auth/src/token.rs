//! Signed session tokens

use berthload_api::Role;
use berthload_util::{SessionId, UserId};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::AuthError;

/// Claims embedded in every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user id.
    pub sub: String,
    pub role: Role,
    /// Session id (UUID string).
    pub sid: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token id (UUID string).
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub
            .parse()
            .map_err(|_| AuthError::TokenInvalid(format!("bad subject '{}'", self.sub)))
    }

    pub fn session_id(&self) -> Result<SessionId, AuthError> {
        SessionId::parse(&self.sid)
            .ok_or_else(|| AuthError::TokenInvalid(format!("bad session id '{}'", self.sid)))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Issues and verifies HS256 session tokens from an injected secret
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Lifetime of issued tokens and their sessions
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for a new session starting at `now`
    pub fn issue(
        &self,
        user_id: UserId,
        role: Role,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<(String, SessionClaims), AuthError> {
        let iat = now.timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            role,
            sid: session_id.to_string(),
            iat,
            exp: iat + self.ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;
        Ok((token, claims))
    }

    /// Check signature and structure, then expiry against `now`
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AuthError> {
        let claims = self.decode(token)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Check signature and structure only. Used to find the session an
    /// older, possibly expired, token belonged to.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared against the service clock in `verify`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })
    }
}
