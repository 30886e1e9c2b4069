/// JWT Claims structure
///
/// Payload carried by both access and refresh tokens: the subject (user id),
/// standard timing claims, the issuer, a kind tag and a unique token id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::TokenError;

/// Which half of a token pair a token is
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub kind: TokenKind,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    /// Unique token id; keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = issued_at.timestamp();
        Self {
            sub: user_id.to_string(),
            kind,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}
