/// Password Hashing and Verification
///
/// bcrypt with a fixed work factor. A mismatch is a plain `false`, not an
/// error; "no such user" is resolved by the caller before this runs.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// bcrypt work factor for stored passwords
pub const PASSWORD_HASH_COST: u32 = 10;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, PASSWORD_HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a plaintext password against a stored bcrypt hash.
///
/// A stored hash bcrypt cannot parse counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be checked");
            false
        }
    }
}
