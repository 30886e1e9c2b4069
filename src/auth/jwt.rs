/// JWT Token Generation and Validation
///
/// [`TokenCodec`] signs and verifies both halves of a token pair. It is built
/// once from [`JwtSettings`] at startup; the derived keys are never replaced
/// while the process runs.

use std::fmt;

use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

/// Why a presented token was refused
#[derive(Debug, Clone, PartialEq)]
pub enum TokenError {
    /// Not a decodable JWT at all
    Malformed,
    Expired,
    InvalidSignature,
    WrongKind {
        expected: TokenKind,
        found: TokenKind,
    },
    /// Signed correctly but some other claim check failed
    Invalid(String),
    /// Signing failed while issuing
    Encoding(String),
}

impl TokenError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TokenError::Malformed => StatusCode::BAD_REQUEST,
            TokenError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TokenError::Expired
            | TokenError::InvalidSignature
            | TokenError::WrongKind { .. }
            | TokenError::Invalid(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::WrongKind { expected, found } => {
                write!(f, "Expected a {} token but got a {} token", expected, found)
            }
            TokenError::Invalid(reason) => write!(f, "Invalid token: {}", reason),
            TokenError::Encoding(msg) => write!(f, "Token generation failed: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidIssuer => TokenError::Invalid("unexpected issuer".to_string()),
            ErrorKind::InvalidAlgorithm => TokenError::Invalid("unexpected algorithm".to_string()),
            ErrorKind::MissingRequiredClaim(claim) => {
                TokenError::Invalid(format!("missing claim {}", claim))
            }
            _ => TokenError::Invalid("rejected".to_string()),
        }
    }
}

/// Signs and parses access and refresh tokens
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenCodec {
    /// Derive signing keys from the configured secret.
    ///
    /// # Errors
    /// Returns error if the secret is shorter than 32 bytes or a lifetime is
    /// not positive
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        if config.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if config.access_token_expiry <= 0 || config.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt token expiries must be positive".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        // Expiry is checked in `parse_at` against the caller's clock
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
        })
    }

    /// Lifetime in seconds of tokens of the given kind
    pub fn expiry_seconds(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_token_expiry,
            TokenKind::Refresh => self.refresh_token_expiry,
        }
    }

    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        self.issue_at(user_id, kind, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(
            user_id,
            kind,
            now,
            self.expiry_seconds(kind),
            self.issuer.clone(),
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature, issuer, expiry and kind; return the claims.
    pub fn parse(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        self.parse_at(token, expected, Utc::now())
    }

    pub fn parse_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                TokenError::from(e)
            })?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.kind,
            });
        }
        claims.user_id()?;

        Ok(claims)
    }
}
