/// Authentication module
///
/// Password verification, JWT access/refresh tokens, the refresh token
/// ledger, and the flows that tie them together.

mod bearer;
mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use bearer::BearerToken;
pub use claims::{Claims, TokenKind};
pub use jwt::{TokenCodec, TokenError};
pub use password::{hash_password, verify_password, PASSWORD_HASH_COST};
pub use refresh_token::{digest_token, RefreshTokenLedger};
pub use service::{AuthService, TokenPair};
