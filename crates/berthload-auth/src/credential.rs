//! Credentials presented by a caller

/// What the caller presented, before any verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Nothing presented
    Missing,
    /// A bearer token, from the cookie or the `Authorization` header
    Token(String),
    /// An `Authorization` header that is not a bearer token
    Malformed,
}

impl Credential {
    /// Pick the credential from a cookie value and an `Authorization`
    /// header value. The cookie wins when both are present.
    pub fn from_parts(cookie: Option<&str>, authorization: Option<&str>) -> Self {
        if let Some(token) = cookie.map(str::trim).filter(|t| !t.is_empty()) {
            return Credential::Token(token.to_string());
        }

        match authorization {
            None => Credential::Missing,
            Some(header) => match header.trim().split_once(' ') {
                Some((scheme, token))
                    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
                {
                    Credential::Token(token.trim().to_string())
                }
                _ => Credential::Malformed,
            },
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Credential::Token(token) => Some(token),
            _ => None,
        }
    }
}
